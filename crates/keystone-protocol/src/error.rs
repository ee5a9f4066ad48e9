//! Error types for the protocol layer.
//!
//! Each crate in Keystone defines its own error enum. A `ProtocolError`
//! always means the problem is in the shape or encoding of a record,
//! never in authentication or persistence.

/// Errors that can occur while encoding, decoding, or validating records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a record into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a record).
    ///
    /// Common causes: malformed JSON, or an `authenticated` entry that
    /// is not an object.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The record decoded fine but violates a record rule, e.g. the
    /// top-level value is not an object.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
