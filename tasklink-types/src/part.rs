use serde::{Deserialize, Serialize};

/// One typed content fragment inside a [`Message`](crate::Message).
///
/// Parts are immutable once constructed; a message owns an ordered
/// sequence of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text content.
    Text { text: String },
    /// Reference to external file content.
    File {
        uri: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
        size_bytes: Option<u64>,
    },
    /// Structured JSON content, optionally pointing at a schema.
    Data {
        data: serde_json::Value,
        #[serde(rename = "schemaRef", skip_serializing_if = "Option::is_none")]
        schema_ref: Option<String>,
    },
}

impl Part {
    /// Convenience constructor for a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Part::Data { data, .. } => Some(data),
            _ => None,
        }
    }
}
