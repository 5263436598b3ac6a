//! JSON method codec using `serde_json`.

use bytes::Bytes;
use serde_json::Value;

use super::{Envelope, MethodCall, MethodCodec};
use crate::error::{PluginError, Result};

/// UTF-8 JSON codec for method calls and envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMethodCodec;

impl JsonMethodCodec {
    fn encode_envelope(envelope: Envelope) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&envelope.into_wire())?))
    }
}

impl MethodCodec for JsonMethodCodec {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(call)?))
    }

    fn decode_method_call(&self, data: &[u8]) -> Result<MethodCall> {
        Ok(serde_json::from_slice(data)?)
    }

    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes> {
        Self::encode_envelope(Envelope::Success(result.clone()))
    }

    fn encode_error_envelope(&self, code: &str, message: &str, details: &Value) -> Result<Bytes> {
        Self::encode_envelope(Envelope::Error(PluginError::new(
            code,
            message,
            details.clone(),
        )))
    }

    fn decode_envelope(&self, data: &[u8]) -> Result<Value> {
        if data.is_empty() {
            return Ok(Value::Null);
        }
        let wire: Value = serde_json::from_slice(data)?;
        Envelope::from_wire(wire)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use serde_json::json;

    #[test]
    fn test_method_call_format() {
        let codec = JsonMethodCodec;
        let encoded = codec
            .encode_method_call(&MethodCall::new("echo", json!("hello")))
            .unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert_eq!(text, r#"{"method":"echo","args":"hello"}"#);
    }

    #[test]
    fn test_decode_method_call() {
        let codec = JsonMethodCodec;
        let call = codec
            .decode_method_call(br#"{"method":"add","args":[1,2]}"#)
            .unwrap();
        assert_eq!(call, MethodCall::new("add", json!([1, 2])));
    }

    #[test]
    fn test_envelope_format() {
        let codec = JsonMethodCodec;

        let success = codec.encode_success_envelope(&json!({"ok": true})).unwrap();
        assert_eq!(success.as_ref(), br#"[{"ok":true}]"#);

        let error = codec
            .encode_error_envelope("error", "boom", &Value::Null)
            .unwrap();
        assert_eq!(error.as_ref(), br#"["error","boom",null]"#);
    }

    #[test]
    fn test_decode_envelope() {
        let codec = JsonMethodCodec;

        assert_eq!(codec.decode_envelope(b"[42]").unwrap(), json!(42));
        assert_eq!(codec.decode_envelope(b"").unwrap(), Value::Null);
        assert!(matches!(
            codec.decode_envelope(br#"["error","boom",null]"#),
            Err(ChannelError::Remote(_))
        ));
        assert!(matches!(
            codec.decode_envelope(b"not json"),
            Err(ChannelError::Json(_))
        ));
    }
}
