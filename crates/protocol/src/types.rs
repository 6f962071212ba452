use serde::{Deserialize, Serialize};

/// Description of the shared file, sent once per handshake request.
///
/// Owned by the sender and immutable for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(rename = "mime")]
    pub mime_type: String,
}

impl FileMetadata {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}
