//! Observable session state and lifecycle events.
//!
//! Two ways to watch a session:
//!
//! - [`SessionState`] snapshots, published through a `tokio::sync::watch`
//!   channel after every change. Good for "render whatever is current".
//! - [`SessionEvent`]s, published through a `tokio::sync::broadcast`
//!   channel. Good for "do something when the user logs in or out".
//!
//! Every snapshot is published before the event that goes with it, so a
//! subscriber reacting to an event always sees the finished state.

use keystone_protocol::{ContentMap, SessionRecord};
use serde_json::Value;

use crate::AuthenticatorError;

/// A point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// `true` while an authenticator backs the session.
    pub is_authenticated: bool,

    /// Name of the authenticator that produced the session, if any.
    pub authenticator: Option<String>,

    /// The session record. `content.authenticated` is the authenticator's
    /// content, without the authenticator name.
    pub content: SessionRecord,

    /// Where the user was headed before being sent to log in. Set and read
    /// by routing code; the controller never touches it.
    pub attempted_transition: Option<Value>,
}

impl SessionState {
    /// Shorthand for `content.authenticated`.
    pub fn authenticated(&self) -> &ContentMap {
        &self.content.authenticated
    }
}

/// Lifecycle notifications for UI and routing layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session went from unauthenticated to authenticated through
    /// `authenticate`, or through a change made in another tab.
    AuthenticationSucceeded,

    /// An authenticated session ended.
    InvalidationSucceeded,

    /// The authenticator refused to invalidate the session. The session is
    /// still authenticated.
    InvalidationFailed(AuthenticatorError),
}
