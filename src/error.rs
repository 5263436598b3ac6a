//! Error types for method-channel.

use serde_json::Value;
use thiserror::Error;

/// Main error type for all channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Bytes decoded fine but do not have the shape of a call or envelope.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Inbound message could not be turned into a method call.
    #[error("Failed to decode incoming message on channel '{channel}': {source}")]
    Decode {
        channel: String,
        #[source]
        source: Box<ChannelError>,
    },

    /// The messenger failed to deliver a message.
    #[error("Messenger error: {0}")]
    Messenger(String),

    /// The remote side answered with an error envelope.
    #[error("Remote error: {0}")]
    Remote(#[from] PluginError),
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Error carried by an error envelope.
///
/// Only the flattened code/message/details survive the trip across the
/// channel; the originating error type is not preserved.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct PluginError {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl PluginError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_display() {
        let err = PluginError::new("error", "boom", Value::Null);
        assert_eq!(err.to_string(), "error: boom");

        let wrapped = ChannelError::from(err);
        assert_eq!(wrapped.to_string(), "Remote error: error: boom");
    }

    #[test]
    fn test_decode_error_keeps_source() {
        let err = ChannelError::Decode {
            channel: "test.channel".to_string(),
            source: Box::new(ChannelError::Codec("expected map".to_string())),
        };
        let text = err.to_string();
        assert!(text.contains("test.channel"));
        assert!(text.contains("expected map"));
    }
}
