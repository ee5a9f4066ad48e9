//! Authenticators: the strategies that actually talk to an identity provider.
//!
//! Keystone doesn't know how to log anyone in. OAuth2 password grants,
//! opaque API tokens, Torii, a custom backend: all of that lives in an
//! [`Authenticator`] implementation. The session controller only decides
//! *when* to call one and what to do with the outcome.
//!
//! Authenticators are looked up by name through an
//! [`AuthenticatorRegistry`] that is handed to the controller when it is
//! built. Names are free-form; the convention is `"authenticator:<kind>"`.
//!
//! # Events
//!
//! An authenticator can change the session on its own schedule, for
//! example after refreshing an access token in the background. It reports
//! that by emitting [`AuthenticatorEvent`]s on its [`EventEmitter`]. While
//! an authenticator backs the active session, the controller is registered
//! as a listener for both event names.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keystone_protocol::{ContentMap, EventEmitter, NamedEvent};
use serde_json::Value;

use crate::{AuthenticatorError, SessionError};

/// Positional credential arguments, forwarded to the authenticator as-is.
pub type Credentials = Vec<Value>;

/// Things an authenticator can tell the session about unprompted.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticatorEvent {
    /// The authenticated content changed (e.g. a refreshed token).
    CredentialsUpdated(ContentMap),

    /// The credentials are no longer valid and the session should end.
    CredentialsInvalidated,
}

impl AuthenticatorEvent {
    /// Listener name for [`AuthenticatorEvent::CredentialsUpdated`].
    pub const CREDENTIALS_UPDATED: &'static str = "credentialsUpdated";
    /// Listener name for [`AuthenticatorEvent::CredentialsInvalidated`].
    pub const CREDENTIALS_INVALIDATED: &'static str = "credentialsInvalidated";
}

impl NamedEvent for AuthenticatorEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::CredentialsUpdated(_) => Self::CREDENTIALS_UPDATED,
            Self::CredentialsInvalidated => Self::CREDENTIALS_INVALIDATED,
        }
    }
}

/// Exchanges credentials for authenticated content, and back.
///
/// The `#[async_trait]` attribute makes the async methods object-safe, so
/// different authenticators can sit side by side in one registry as
/// `Arc<dyn Authenticator>`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use keystone_protocol::{ContentMap, EventEmitter};
/// use keystone_session::{
///     Authenticator, AuthenticatorError, AuthenticatorEvent, Credentials,
/// };
/// use serde_json::Value;
///
/// /// Accepts any non-empty string as a token. Development only!
/// #[derive(Default)]
/// struct DevAuthenticator {
///     events: EventEmitter<AuthenticatorEvent>,
/// }
///
/// #[async_trait]
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(
///         &self,
///         credentials: Credentials,
///     ) -> Result<ContentMap, AuthenticatorError> {
///         match credentials.first() {
///             Some(Value::String(token)) if !token.is_empty() => {
///                 let mut content = ContentMap::new();
///                 content.insert("token".into(), Value::String(token.clone()));
///                 Ok(content)
///             }
///             _ => Err(AuthenticatorError::Rejected("token required".into())),
///         }
///     }
///
///     async fn restore(
///         &self,
///         content: ContentMap,
///     ) -> Result<ContentMap, AuthenticatorError> {
///         if content.contains_key("token") {
///             Ok(content)
///         } else {
///             Err(AuthenticatorError::Expired)
///         }
///     }
///
///     fn events(&self) -> &EventEmitter<AuthenticatorEvent> {
///         &self.events
///     }
/// }
/// ```
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Exchanges `credentials` for authenticated content.
    async fn authenticate(
        &self,
        credentials: Credentials,
    ) -> Result<ContentMap, AuthenticatorError>;

    /// Ends the session described by `content` at the identity provider.
    ///
    /// The default does nothing and succeeds, which is right for
    /// authenticators whose sessions only exist on the client.
    async fn invalidate(&self, content: ContentMap) -> Result<(), AuthenticatorError> {
        let _ = content;
        Ok(())
    }

    /// Checks persisted content and returns the content to resume with.
    ///
    /// `content` never includes the authenticator's own name.
    async fn restore(&self, content: ContentMap) -> Result<ContentMap, AuthenticatorError>;

    /// The emitter this authenticator fires [`AuthenticatorEvent`]s on.
    fn events(&self) -> &EventEmitter<AuthenticatorEvent>;
}

/// Resolves authenticator names to instances.
///
/// Built once by the application and moved into the
/// [`SessionController`](crate::SessionController). Lookups are
/// synchronous map reads.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
}

impl AuthenticatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `authenticator` under `name`, returning whatever was
    /// registered there before.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.insert(name.into(), authenticator)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Self {
        self.register(name, authenticator);
        self
    }

    /// Looks up the authenticator registered under `name`.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownAuthenticator`] if there is none.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Authenticator>, SessionError> {
        self.authenticators
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAuthenticator(name.to_owned()))
    }

    /// Returns `true` if something is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.authenticators.contains_key(name)
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.authenticators.keys().map(String::as_str)
    }
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.authenticators.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Noop {
        events: EventEmitter<AuthenticatorEvent>,
    }

    #[async_trait]
    impl Authenticator for Noop {
        async fn authenticate(&self, _: Credentials) -> Result<ContentMap, AuthenticatorError> {
            Ok(ContentMap::new())
        }

        async fn restore(&self, content: ContentMap) -> Result<ContentMap, AuthenticatorError> {
            Ok(content)
        }

        fn events(&self) -> &EventEmitter<AuthenticatorEvent> {
            &self.events
        }
    }

    #[test]
    fn test_lookup_registered_returns_instance() {
        let registry = AuthenticatorRegistry::new().with("authenticator:noop", Arc::new(Noop::default()));

        assert!(registry.lookup("authenticator:noop").is_ok());
        assert!(registry.contains("authenticator:noop"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["authenticator:noop"]);
    }

    #[test]
    fn test_lookup_unknown_returns_error() {
        let registry = AuthenticatorRegistry::new();

        let result = registry.lookup("authenticator:missing");

        assert!(matches!(
            result,
            Err(SessionError::UnknownAuthenticator(name)) if name == "authenticator:missing"
        ));
    }

    #[test]
    fn test_register_replaces_previous_instance() {
        let mut registry = AuthenticatorRegistry::new();
        assert!(registry.register("a", Arc::new(Noop::default())).is_none());
        assert!(registry.register("a", Arc::new(Noop::default())).is_some());
    }

    #[tokio::test]
    async fn test_default_invalidate_succeeds() {
        let noop = Noop::default();
        assert_eq!(noop.invalidate(ContentMap::new()).await, Ok(()));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            AuthenticatorEvent::CredentialsUpdated(ContentMap::new()).name(),
            "credentialsUpdated"
        );
        assert_eq!(
            AuthenticatorEvent::CredentialsInvalidated.name(),
            "credentialsInvalidated"
        );
    }
}
