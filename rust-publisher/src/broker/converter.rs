//! JSON message conversion.

use serde::{de::DeserializeOwned, Serialize};

/// Converts records to AMQP message bodies and back using JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageConverter;

impl JsonMessageConverter {
    /// Content type stamped on every converted message.
    pub const CONTENT_TYPE: &'static str = "application/json";

    pub fn to_message<T: Serialize + ?Sized>(&self, payload: &T) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(payload)
    }

    pub fn from_message<T: DeserializeOwned>(&self, body: &[u8]) -> serde_json::Result<T> {
        serde_json::from_slice(body)
    }
}
