//! MsgPack method codec using `rmp-serde`.
//!
//! **CRITICAL**: Always use `to_vec_named`, NEVER `to_vec`!
//! The method call is a struct and peers expect the struct-as-map format
//! (`{"method": ..., "args": ...}`), not a positional array.

use bytes::Bytes;
use serde_json::Value;

use super::{Envelope, MethodCall, MethodCodec};
use crate::error::{PluginError, Result};

/// MessagePack codec for method calls and envelopes.
///
/// Values travel as [`serde_json::Value`], which has no byte-string variant.
/// A MessagePack `bin` anywhere in a call or envelope therefore fails to
/// decode: an inbound call carrying `bin` arguments is rejected as a decode
/// error and gets no reply. Peers must send binary data as an array of
/// integers or as an encoded string (e.g. base64).
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackMethodCodec;

impl MsgPackMethodCodec {
    /// Encode a value to MsgPack bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        // CRITICAL: to_vec_named, NOT to_vec!
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    fn encode_envelope(envelope: Envelope) -> Result<Bytes> {
        Ok(Bytes::from(Self::encode(&envelope.into_wire())?))
    }
}

impl MethodCodec for MsgPackMethodCodec {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        Ok(Bytes::from(Self::encode(call)?))
    }

    fn decode_method_call(&self, data: &[u8]) -> Result<MethodCall> {
        Self::decode(data)
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
        let wire: Value = Self::decode(data)?;
        Envelope::from_wire(wire)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use serde_json::json;

    #[test]
    fn test_method_call_roundtrip() {
        let codec = MsgPackMethodCodec;
        let call = MethodCall::new("echo", json!({"message": "hello", "count": 3}));

        let encoded = codec.encode_method_call(&call).unwrap();
        let decoded = codec.decode_method_call(&encoded).unwrap();

        assert_eq!(decoded, call);
    }

    #[test]
    fn test_method_call_is_named_map() {
        let codec = MsgPackMethodCodec;
        let encoded = codec
            .encode_method_call(&MethodCall::new("echo", Value::Null))
            .unwrap();

        // 0x82 = fixmap with 2 elements (method, args); a positional
        // encoding would start with 0x92 (fixarray).
        assert_eq!(encoded[0], 0x82, "Expected fixmap with 2 elements");
    }

    #[test]
    fn test_success_envelope() {
        let codec = MsgPackMethodCodec;
        let encoded = codec.encode_success_envelope(&json!(42)).unwrap();

        // fixarray(1) followed by positive fixint 42
        assert_eq!(encoded.as_ref(), &[0x91, 0x2a]);
        assert_eq!(codec.decode_envelope(&encoded).unwrap(), json!(42));
    }

    #[test]
    fn test_error_envelope() {
        let codec = MsgPackMethodCodec;
        let encoded = codec
            .encode_error_envelope("error", "boom", &Value::Null)
            .unwrap();

        match codec.decode_envelope(&encoded) {
            Err(ChannelError::Remote(err)) => {
                assert_eq!(err.code, "error");
                assert_eq!(err.message, "boom");
                assert_eq!(err.details, Value::Null);
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_envelope_is_null() {
        let codec = MsgPackMethodCodec;
        assert_eq!(codec.decode_envelope(&[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let codec = MsgPackMethodCodec;
        // 0xc1 is never used in MessagePack
        assert!(codec.decode_method_call(&[0xc1]).is_err());
        assert!(codec.decode_envelope(&[0xc1]).is_err());
    }

    #[test]
    fn test_decode_method_call_wrong_shape() {
        let codec = MsgPackMethodCodec;
        let not_a_call = MsgPackMethodCodec::encode(&"just a string").unwrap();
        assert!(codec.decode_method_call(&not_a_call).is_err());
    }

    #[test]
    fn test_bin_arguments_are_rejected() {
        let codec = MsgPackMethodCodec;
        // {"method": "echo", "args": bin8[1, 2, 3]}
        let mut data = vec![0x82, 0xa6];
        data.extend_from_slice(b"method");
        data.push(0xa4);
        data.extend_from_slice(b"echo");
        data.push(0xa4);
        data.extend_from_slice(b"args");
        data.extend_from_slice(&[0xc4, 0x03, 0x01, 0x02, 0x03]);

        assert!(codec.decode_method_call(&data).is_err());
    }
}
