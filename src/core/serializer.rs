use serde_json::Value;

use crate::core::error::FetchError;
use crate::core::transport::Response;

/// Expected shape of a successful response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Parse the body as JSON. An empty body decodes to `null`.
    #[default]
    Json,
    /// Keep the body as a UTF-8 string.
    Text,
}

/// Encodes request bodies for the wire and decodes response bodies into payloads.
pub trait Serializer: Send + Sync {
    /// `Content-Type` sent with encoded bodies, if any.
    fn content_type(&self) -> Option<&str>;

    /// # Errors
    /// Returns `ESERIALIZE` if the value cannot be encoded.
    fn serialize(&self, body: &Value) -> Result<Vec<u8>, FetchError>;

    /// # Errors
    /// Returns `ESERIALIZE` if the response body does not match `shape`.
    fn deserialize(&self, response: &Response, shape: ResponseType) -> Result<Value, FetchError>;
}

/// JSON in, JSON (or text) out.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn content_type(&self) -> Option<&str> {
        Some("application/json")
    }

    fn serialize(&self, body: &Value) -> Result<Vec<u8>, FetchError> {
        serde_json::to_vec(body).map_err(FetchError::serialize)
    }

    fn deserialize(&self, response: &Response, shape: ResponseType) -> Result<Value, FetchError> {
        match shape {
            ResponseType::Json if response.bytes().is_empty() => Ok(Value::Null),
            ResponseType::Json => response.json(),
            ResponseType::Text => response.text().map(Value::String),
        }
    }
}
