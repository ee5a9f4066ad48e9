//! Error types for the session layer.

/// Errors an authenticator reports when it refuses to authenticate,
/// restore, or invalidate a session.
///
/// `Clone` because the same failure is both returned to the caller and
/// broadcast to lifecycle subscribers (see
/// [`SessionEvent::InvalidationFailed`](crate::SessionEvent::InvalidationFailed)).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticatorError {
    /// The identity provider rejected the credentials or the stored
    /// session data.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The stored session data is no longer valid (e.g. the refresh token
    /// lapsed).
    #[error("session expired")]
    Expired,

    /// The identity provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while driving the session state machine.
///
/// Precondition violations (an empty authenticator name, invalidating an
/// unauthenticated session, writing the reserved `authenticated` key) are
/// programming errors and panic instead of showing up here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No authenticator is registered under this name.
    /// Nothing about the session changed.
    #[error("no authenticator registered as \"{0}\"")]
    UnknownAuthenticator(String),

    /// The authenticator rejected the request. Carries its error unchanged.
    #[error(transparent)]
    Authenticator(#[from] AuthenticatorError),

    /// `restore` found no authenticator named in the persisted record, so
    /// the session starts out unauthenticated.
    #[error("no authenticated session to restore")]
    NothingToRestore,

    /// An invalidation request reached the session actor after the session
    /// had already become unauthenticated (e.g. logged out in another tab).
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The session actor has shut down.
    #[error("session controller is no longer running")]
    Unavailable,
}

impl SessionError {
    /// Returns the authenticator's own error, if that is what this is.
    pub fn authenticator_error(&self) -> Option<&AuthenticatorError> {
        match self {
            Self::Authenticator(error) => Some(error),
            _ => None,
        }
    }
}
