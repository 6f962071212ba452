use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::{MAX_MESSAGE_SIZE, MessageType};

/// Envelope for all data-channel communication.
///
/// The `payload` field uses `serde_json::value::RawValue` to defer
/// deserialization until the receiver knows which shape to expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
}

impl Message {
    /// Creates a new message with the given type and payload.
    pub fn new<T: Serialize>(
        msg_type: MessageType,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match payload {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            msg_type,
            payload: raw,
        })
    }

    /// Creates a message that carries no payload.
    pub fn bare(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            payload: None,
        }
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.payload {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// Deserializes a required payload, reporting absence or a shape
    /// mismatch as a malformed message.
    pub fn require_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        match self.parse_payload::<T>() {
            Ok(Some(p)) => Ok(p),
            Ok(None) => Err(ProtocolError::Malformed(format!(
                "{} without payload",
                self.msg_type
            ))),
            Err(e) => Err(ProtocolError::Malformed(format!(
                "{} payload: {e}",
                self.msg_type
            ))),
        }
    }

    /// Encodes the message as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a JSON text frame, enforcing [`MAX_MESSAGE_SIZE`].
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}
