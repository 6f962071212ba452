use roomdrop_protocol::{ChunkPayload, FileMetadata};
use tracing::trace;

use crate::cipher::transform_in_place;
use crate::{ReceivedFile, TransferError};

/// Result of accepting one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// More bytes are expected; request the chunk at `next_offset`.
    NeedMore { next_offset: u64 },
    /// The declared size has been reached.
    Finished,
}

/// Receiver-side reassembly of one file.
///
/// Chunks must arrive in request order (one outstanding request at a time),
/// so accepting is a plain append. `bytes_transferred` is the resume cursor:
/// always the sum of accepted chunk lengths.
#[derive(Debug)]
pub struct ChunkAssembler {
    metadata: FileMetadata,
    key: u8,
    buffer: Vec<u8>,
    chunks: usize,
}

impl ChunkAssembler {
    pub fn new(metadata: FileMetadata, key: u8) -> Self {
        // Cap the up-front reservation; a hostile size must not allocate.
        let reserve = metadata.size.min(64 * 1024 * 1024) as usize;
        Self {
            metadata,
            key,
            buffer: Vec::with_capacity(reserve),
            chunks: 0,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn chunks_accepted(&self) -> usize {
        self.chunks
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred() == self.metadata.size
    }

    /// Next offset to request, or `None` once complete.
    pub fn next_offset(&self) -> Option<u64> {
        (!self.is_complete()).then(|| self.bytes_transferred())
    }

    /// De-obfuscates and appends `chunk`.
    ///
    /// Rejects empty chunks, chunks at any offset other than the cursor, and
    /// chunks that would run past the declared size. A rejected chunk leaves
    /// the assembler unchanged.
    pub fn accept(&mut self, chunk: ChunkPayload) -> Result<Accepted, TransferError> {
        let expected = self.bytes_transferred();
        if chunk.buffer.is_empty() {
            return Err(TransferError::EmptyChunk {
                offset: chunk.offset,
            });
        }
        if chunk.offset != expected {
            return Err(TransferError::UnexpectedOffset {
                expected,
                got: chunk.offset,
            });
        }
        let end = chunk.end();
        if end > self.metadata.size {
            return Err(TransferError::ChunkOverrun {
                end,
                size: self.metadata.size,
            });
        }

        let mut bytes = chunk.buffer;
        transform_in_place(&mut bytes, self.key);
        self.buffer.extend_from_slice(&bytes);
        self.chunks += 1;
        trace!(offset = chunk.offset, len = bytes.len(), total = end, "chunk accepted");

        if self.is_complete() {
            Ok(Accepted::Finished)
        } else {
            Ok(Accepted::NeedMore { next_offset: end })
        }
    }

    /// Consumes the assembler and returns the reassembled file.
    pub fn finish(self) -> Result<ReceivedFile, TransferError> {
        if !self.is_complete() {
            return Err(TransferError::Incomplete {
                received: self.bytes_transferred(),
                size: self.metadata.size,
            });
        }
        Ok(ReceivedFile::new(self.metadata, self.buffer))
    }
}
