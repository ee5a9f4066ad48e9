//! # Keystone
//!
//! Client-side authentication session management.
//!
//! Keystone keeps track of whether the user is logged in, which
//! authenticator logged them in, and what that authenticator handed back.
//! Applications plug in their own [`Authenticator`]s and
//! [`SessionStore`]s; Keystone coordinates them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keystone::prelude::*;
//!
//! # async fn run(my_authenticator: Arc<dyn Authenticator>) -> Result<(), KeystoneError> {
//! let registry = AuthenticatorRegistry::new().with("authenticator:token", my_authenticator);
//! let store = Arc::new(EphemeralStore::new());
//! let session = spawn_session(SessionController::new(registry, store, SessionConfig::default()));
//!
//! if session.restore().await.is_err() {
//!     session
//!         .authenticate("authenticator:token", vec!["secret".into()])
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::KeystoneError;
pub use keystone_protocol::{
    AUTHENTICATED_KEY, AUTHENTICATOR_KEY, Codec, ContentMap, EventEmitter, JsonCodec, ListenerId,
    NamedEvent, ProtocolError, SessionRecord,
};
pub use keystone_session::{
    Authenticator, AuthenticatorError, AuthenticatorEvent, AuthenticatorRegistry, Credentials,
    Notification, SessionConfig, SessionController, SessionError, SessionEvent, SessionHandle,
    SessionState, spawn_session,
};
pub use keystone_store::{EphemeralStore, SessionStore, StoreEvent};

/// Re-exported so authenticator implementations don't need their own
/// `async-trait` dependency.
pub use async_trait::async_trait;

/// Everything needed to wire up a session and write an authenticator.
pub mod prelude {
    pub use crate::{
        Authenticator, AuthenticatorError, AuthenticatorEvent, AuthenticatorRegistry, ContentMap,
        Credentials, EphemeralStore, EventEmitter, KeystoneError, SessionConfig,
        SessionController, SessionEvent, SessionHandle, SessionRecord, SessionState,
        SessionStore, async_trait, spawn_session,
    };
}
