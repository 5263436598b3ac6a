//! Codec module - method calls and reply envelopes to/from bytes.
//!
//! This module defines the [`MethodCodec`] interface the channel is bound to,
//! and provides two implementations:
//!
//! - [`MsgPackMethodCodec`] - MessagePack using `rmp-serde` (named maps)
//! - [`JsonMethodCodec`] - UTF-8 JSON using `serde_json`
//!
//! # Wire shapes
//!
//! Both codecs share the same logical layout:
//!
//! ```text
//! method call       {"method": <string>, "args": <value>}
//! success envelope  [<value>]
//! error envelope    [<code>, <message>, <details>]
//! no reply          (empty bytes)
//! ```
//!
//! # Example
//!
//! ```
//! use method_channel::codec::{JsonMethodCodec, MethodCall, MethodCodec};
//! use serde_json::json;
//!
//! let codec = JsonMethodCodec;
//! let call = MethodCall::new("echo", json!("hello"));
//! let bytes = codec.encode_method_call(&call).unwrap();
//! assert_eq!(codec.decode_method_call(&bytes).unwrap(), call);
//!
//! let reply = codec.encode_success_envelope(&json!(42)).unwrap();
//! assert_eq!(codec.decode_envelope(&reply).unwrap(), json!(42));
//! ```

mod json;
mod msgpack;

pub use json::JsonMethodCodec;
pub use msgpack::MsgPackMethodCodec;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, PluginError, Result};

/// A method invocation: the method name and its (dynamic) arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(rename = "args", default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Outcome of a call as it travels back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Error(PluginError),
}

impl Envelope {
    /// Array form shared by all codecs.
    pub(crate) fn into_wire(self) -> Value {
        match self {
            Envelope::Success(value) => Value::Array(vec![value]),
            Envelope::Error(err) => Value::Array(vec![
                Value::String(err.code),
                Value::String(err.message),
                err.details,
            ]),
        }
    }

    pub(crate) fn from_wire(wire: Value) -> Result<Self> {
        let items = match wire {
            Value::Array(items) => items,
            other => {
                return Err(ChannelError::Codec(format!(
                    "envelope must be an array, got {}",
                    other
                )))
            }
        };

        let len = items.len();
        let mut parts = items.into_iter();
        match (len, parts.next(), parts.next(), parts.next()) {
            (1, Some(value), None, None) => Ok(Envelope::Success(value)),
            (3, Some(Value::String(code)), Some(message), Some(details)) => {
                let message = match message {
                    Value::String(message) => message,
                    Value::Null => String::new(),
                    other => {
                        return Err(ChannelError::Codec(format!(
                            "error envelope message must be a string, got {}",
                            other
                        )))
                    }
                };
                Ok(Envelope::Error(PluginError::new(code, message, details)))
            }
            (3, _, _, _) => Err(ChannelError::Codec(
                "error envelope code must be a string".to_string(),
            )),
            _ => Err(ChannelError::Codec(format!(
                "envelope must have 1 or 3 elements, got {}",
                len
            ))),
        }
    }

    /// Success becomes `Ok(value)`, error becomes [`ChannelError::Remote`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Envelope::Success(value) => Ok(value),
            Envelope::Error(err) => Err(ChannelError::Remote(err)),
        }
    }
}

/// Serializer/deserializer for method calls and reply envelopes.
///
/// Implementations must be cheap to share; the channel holds one behind an
/// `Arc` and calls it from every dispatch task.
pub trait MethodCodec: Send + Sync + std::fmt::Debug {
    /// Encode an outgoing method call.
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes>;

    /// Decode an incoming method call.
    fn decode_method_call(&self, data: &[u8]) -> Result<MethodCall>;

    /// Encode a successful result.
    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes>;

    /// Encode an error result.
    fn encode_error_envelope(&self, code: &str, message: &str, details: &Value) -> Result<Bytes>;

    /// Decode a reply envelope.
    ///
    /// An empty reply means "no value" and decodes to `Value::Null`.
    fn decode_envelope(&self, data: &[u8]) -> Result<Value>;
}
