//! Pull-based chunk flow with a credit of one.
//!
//! The receiver keeps at most one request outstanding and only asks for the
//! next offset after the previous chunk was appended. The sender answers
//! each request statelessly from a read-only source.

use roomdrop_protocol::{ChunkPayload, ChunkRequest, FileMetadata};
use roomdrop_transfer::cipher::transform_in_place;
use roomdrop_transfer::{
    Accepted, ChunkAssembler, ChunkSource, ProgressMeter, ReceivedFile, TransferError, read_chunk,
};

/// What the receiver does after accepting a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    /// Request the chunk at this offset.
    Request(u64),
    /// All bytes are in; call [`ReceiveFlow::finish`].
    Finished,
}

/// Receiver side of one transfer.
#[derive(Debug)]
pub struct ReceiveFlow {
    assembler: ChunkAssembler,
    progress: ProgressMeter,
    outstanding: Option<u64>,
}

impl ReceiveFlow {
    pub fn new(metadata: FileMetadata, key: u8) -> Self {
        let progress = ProgressMeter::new(metadata.size);
        Self {
            assembler: ChunkAssembler::new(metadata, key),
            progress,
            outstanding: None,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        self.assembler.metadata()
    }

    /// The resume cursor: sum of accepted chunk lengths.
    pub fn bytes_transferred(&self) -> u64 {
        self.assembler.bytes_transferred()
    }

    pub fn progress(&self) -> &ProgressMeter {
        &self.progress
    }

    /// Offset of the request in flight.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding
    }

    /// First step of the transfer: request offset 0, or finish straight
    /// away for an empty file.
    pub fn start(&mut self) -> FlowStep {
        match self.assembler.next_offset() {
            Some(offset) => {
                self.outstanding = Some(offset);
                FlowStep::Request(offset)
            }
            None => FlowStep::Finished,
        }
    }

    /// Appends `chunk` if it answers the outstanding request.
    pub fn on_chunk(&mut self, chunk: ChunkPayload) -> Result<FlowStep, TransferError> {
        let Some(expected) = self.outstanding else {
            return Err(TransferError::Unsolicited {
                offset: chunk.offset,
            });
        };
        if chunk.offset != expected {
            return Err(TransferError::UnexpectedOffset {
                expected,
                got: chunk.offset,
            });
        }
        let step = match self.assembler.accept(chunk)? {
            Accepted::NeedMore { next_offset } => {
                self.outstanding = Some(next_offset);
                FlowStep::Request(next_offset)
            }
            Accepted::Finished => {
                self.outstanding = None;
                FlowStep::Finished
            }
        };
        self.progress.update(self.assembler.bytes_transferred());
        Ok(step)
    }

    pub fn finish(self) -> Result<ReceivedFile, TransferError> {
        self.assembler.finish()
    }
}

/// Answers a chunk request: reads `[offset, offset + chunk_size)` clipped to
/// the source size and obfuscates it with `key`.
pub fn serve_chunk(
    source: &dyn ChunkSource,
    request: ChunkRequest,
    chunk_size: usize,
    key: u8,
) -> Result<ChunkPayload, TransferError> {
    let mut buffer = read_chunk(source, request.offset, chunk_size)?;
    transform_in_place(&mut buffer, key);
    Ok(ChunkPayload {
        offset: request.offset,
        buffer,
    })
}
