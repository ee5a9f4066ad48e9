//! Unified error type for Keystone.

use keystone_protocol::ProtocolError;
use keystone_session::{AuthenticatorError, SessionError};

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `keystone` facade crate you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum KeystoneError {
    /// A record could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session operation failed (lookup, rejection, nothing to restore).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<AuthenticatorError> for KeystoneError {
    fn from(error: AuthenticatorError) -> Self {
        Self::Session(SessionError::Authenticator(error))
    }
}
