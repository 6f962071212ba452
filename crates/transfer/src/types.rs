use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use roomdrop_protocol::FileMetadata;
use tracing::info;

use crate::validation::{destination_candidates, no_free_name};
use crate::{TransferError, checksum_bytes};

/// A fully reassembled file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    metadata: FileMetadata,
    data: Vec<u8>,
}

impl ReceivedFile {
    pub(crate) fn new(metadata: FileMetadata, data: Vec<u8>) -> Self {
        Self { metadata, data }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Hex SHA-256 of the content.
    pub fn sha256(&self) -> String {
        checksum_bytes(&self.data)
    }

    /// Writes the file into `dir` under its sanitised name, never
    /// overwriting an existing file. Returns the path written.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, TransferError> {
        std::fs::create_dir_all(dir)?;
        for path in destination_candidates(dir, &self.metadata.name) {
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(&self.data)?;
            info!(path = %path.display(), size = self.data.len(), "file saved");
            return Ok(path);
        }
        Err(no_free_name(dir, &self.metadata.name))
    }
}
