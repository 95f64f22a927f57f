//! Error types for the publishing client.

use thiserror::Error;

/// Failure to issue a publish. Broker-side outcomes (nack, return) are not
/// errors here; they are reported to the delivery observer instead.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

pub type Result<T> = std::result::Result<T, PublishError>;
