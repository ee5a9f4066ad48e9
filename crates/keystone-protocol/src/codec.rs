//! Codec trait and implementations for serializing session records.
//!
//! Stores that keep a serialized copy of the session (rather than a live
//! Rust value) go through a [`Codec`]. Holding bytes instead of a shared
//! value guarantees that a store can only ever hand out copies of the
//! record; nobody gets mutation rights over the controller's live state.
//!
//! Currently we provide [`JsonCodec`], which matches what browser-style
//! storage backends keep.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// - `Send + Sync` → safe to share between the store and the tasks that
///   read from it.
/// - `'static` → the codec owns everything it needs, so it can live inside
///   a long-lived store.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use keystone_protocol::{Codec, JsonCodec, SessionRecord};
///
/// let codec = JsonCodec;
/// let record = SessionRecord::new().tagged_with("authenticator:token");
///
/// let bytes = codec.encode(&record).unwrap();
/// let decoded: SessionRecord = codec.decode(&bytes).unwrap();
/// assert_eq!(record, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        // A record must be a JSON object; reject `[]`, `"x"`, `1` up front
        // so callers get a clearer message than serde's type mismatch.
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidRecord(format!(
                "expected a JSON object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(ProtocolError::Decode)
    }
}
