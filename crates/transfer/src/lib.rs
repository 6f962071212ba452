//! Chunked file transfer primitives: obfuscation, chunk sources, reassembly
//! and progress.
//!
//! Everything here is synchronous and free of I/O scheduling; the session
//! crate decides when each piece runs.

pub mod cipher;
mod assembler;
mod chunked;
mod progress;
mod types;
mod validation;

pub use assembler::{Accepted, ChunkAssembler};
pub use chunked::{
    ChunkSource, FileSource, MemorySource, calculate_file_checksum, checksum_bytes, read_chunk,
};
pub use progress::ProgressMeter;
pub use types::ReceivedFile;
pub use validation::sanitize_file_name;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty chunk at offset {offset}")]
    EmptyChunk { offset: u64 },

    #[error("unexpected chunk offset: expected {expected}, got {got}")]
    UnexpectedOffset { expected: u64, got: u64 },

    #[error("unsolicited chunk at offset {offset}")]
    Unsolicited { offset: u64 },

    #[error("chunk ending at {end} overruns declared size {size}")]
    ChunkOverrun { end: u64, size: u64 },

    #[error("offset {offset} out of range for size {size}")]
    OffsetOutOfRange { offset: u64, size: u64 },

    #[error("transfer incomplete: {received} of {size} bytes")]
    Incomplete { received: u64, size: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
