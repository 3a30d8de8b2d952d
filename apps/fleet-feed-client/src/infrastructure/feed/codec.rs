//! Payload Codec
//!
//! Decodes feed text frames into vehicle records.
//!
//! A frame is either a single JSON object or a JSON array of objects:
//!
//! ```json
//! {"id":"7","lat":10.0,"lng":20.0}
//! [{"id":"7","lat":10.0,"lng":20.0,"route":"101"},{"id":"8","lat":1.0,"lng":2.0}]
//! ```
//!
//! Decoding is all-or-nothing: one malformed element rejects the frame.

use crate::domain::vehicle::VehicleUpdate;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for vehicle position frames.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into vehicle records.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not an object or array, or if any
    /// record is missing a required field or has the wrong type.
    pub fn decode(&self, text: &str) -> Result<Vec<VehicleUpdate>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            Ok(serde_json::from_str(trimmed)?)
        } else if trimmed.starts_with('{') {
            let update: VehicleUpdate = serde_json::from_str(trimmed)?;
            Ok(vec![update])
        } else {
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}...",
                preview(trimmed)
            )))
        }
    }
}

/// First 50 characters of a frame, cut on a char boundary.
fn preview(text: &str) -> &str {
    text.char_indices()
        .nth(50)
        .map_or(text, |(idx, _)| &text[..idx])
}
