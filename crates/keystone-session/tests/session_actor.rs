//! Integration tests for the session actor, using only the public API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keystone_protocol::{ContentMap, EventEmitter, JsonCodec, SessionRecord};
use keystone_session::{
    Authenticator, AuthenticatorError, AuthenticatorEvent, AuthenticatorRegistry, Credentials,
    SessionConfig, SessionController, SessionError, SessionEvent, SessionHandle, spawn_session,
};
use keystone_store::{EphemeralStore, SessionStore};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::timeout;

// =========================================================================
// Test authenticator: a string token in, `{ "token": .. }` out.
// =========================================================================

#[derive(Default)]
struct TokenAuthenticator {
    events: EventEmitter<AuthenticatorEvent>,
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(
        &self,
        credentials: Credentials,
    ) -> Result<ContentMap, AuthenticatorError> {
        match credentials.first() {
            Some(Value::String(token)) if token != "wrong" => Ok(token_content(token)),
            _ => Err(AuthenticatorError::Rejected("bad token".into())),
        }
    }

    async fn restore(&self, content: ContentMap) -> Result<ContentMap, AuthenticatorError> {
        if content.contains_key("token") {
            Ok(content)
        } else {
            Err(AuthenticatorError::Expired)
        }
    }

    fn events(&self) -> &EventEmitter<AuthenticatorEvent> {
        &self.events
    }
}

// =========================================================================
// Helpers
// =========================================================================

const TOKEN: &str = "authenticator:token";

fn token_content(token: &str) -> ContentMap {
    let mut content = ContentMap::new();
    content.insert("token".into(), json!(token));
    content
}

fn start(store: &Arc<EphemeralStore>) -> (SessionHandle, Arc<TokenAuthenticator>) {
    let authenticator = Arc::new(TokenAuthenticator::default());
    let registry = AuthenticatorRegistry::new().with(TOKEN, authenticator.clone());
    let controller = SessionController::new(registry, store.clone(), SessionConfig::default());
    (spawn_session(controller), authenticator)
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event should arrive in time")
        .expect("channel open")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_handle_authenticate_publishes_state_and_event() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    let mut events = session.subscribe();

    session
        .authenticate(TOKEN, vec![json!("abc")])
        .await
        .expect("should authenticate");

    assert!(session.is_authenticated());
    assert_eq!(session.state().authenticator.as_deref(), Some(TOKEN));
    assert_eq!(next_event(&mut events).await, SessionEvent::AuthenticationSucceeded);
    assert_eq!(store.restore().authenticator_name(), Some(TOKEN));
}

#[tokio::test]
async fn test_handle_authenticate_rejected_returns_authenticator_error() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);

    let result = session.authenticate(TOKEN, vec![json!("wrong")]).await;

    assert!(matches!(
        result,
        Err(SessionError::Authenticator(AuthenticatorError::Rejected(_)))
    ));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_handle_invalidate_fires_invalidation_succeeded() {
    let store = Arc::new(EphemeralStore::new());
    let (session, authenticator) = start(&store);
    session.authenticate(TOKEN, vec![json!("abc")]).await.unwrap();
    let mut events = session.subscribe();

    session.invalidate().await.expect("should invalidate");

    assert!(!session.is_authenticated());
    assert_eq!(next_event(&mut events).await, SessionEvent::InvalidationSucceeded);
    assert_eq!(
        authenticator
            .events()
            .listener_count(AuthenticatorEvent::CREDENTIALS_UPDATED),
        0
    );
}

#[tokio::test]
async fn test_handle_restore_seeded_store_resumes_without_event() {
    let mut seeded = SessionRecord::new();
    seeded.authenticated = token_content("persisted");
    let store = Arc::new(EphemeralStore::seeded(JsonCodec, &seeded.tagged_with(TOKEN)));
    let (session, _) = start(&store);
    let mut events = session.subscribe();

    session.restore().await.expect("should restore");

    assert!(session.is_authenticated());
    assert_eq!(
        session.state().authenticated().get("token"),
        Some(&json!("persisted"))
    );
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_handle_restore_empty_store_returns_nothing_to_restore() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);

    let result = session.restore().await;

    assert!(matches!(result, Err(SessionError::NothingToRestore)));
}

#[tokio::test]
async fn test_actor_applies_logout_from_other_tab() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    session.authenticate(TOKEN, vec![json!("abc")]).await.unwrap();
    let mut events = session.subscribe();

    store.simulate_external_update(SessionRecord::new());

    assert_eq!(next_event(&mut events).await, SessionEvent::InvalidationSucceeded);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_actor_applies_login_from_other_tab() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    let mut events = session.subscribe();

    let mut other_tab = SessionRecord::new();
    other_tab.authenticated = token_content("from-other-tab");
    store.simulate_external_update(other_tab.tagged_with(TOKEN));

    assert_eq!(next_event(&mut events).await, SessionEvent::AuthenticationSucceeded);
    assert_eq!(
        session.state().authenticated().get("token"),
        Some(&json!("from-other-tab"))
    );
}

#[tokio::test]
async fn test_actor_applies_refreshed_credentials() {
    let store = Arc::new(EphemeralStore::new());
    let (session, authenticator) = start(&store);
    session.authenticate(TOKEN, vec![json!("abc")]).await.unwrap();
    let mut watch = session.watch();
    watch.mark_unchanged();

    authenticator
        .events()
        .emit(AuthenticatorEvent::CredentialsUpdated(token_content("refreshed")));

    timeout(Duration::from_secs(1), watch.changed())
        .await
        .expect("state should change in time")
        .expect("actor running");
    assert_eq!(
        watch.borrow().authenticated().get("token"),
        Some(&json!("refreshed"))
    );
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_handle_set_persists_through_actor() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);

    session.set("locale", json!("en")).await.unwrap();
    session
        .set_attempted_transition(Some(json!("/settings")))
        .await
        .unwrap();

    assert_eq!(store.restore().get("locale"), Some(&json!("en")));
    assert_eq!(session.state().attempted_transition, Some(json!("/settings")));
}

#[tokio::test]
async fn test_handle_clones_share_one_session() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    let other = session.clone();

    session.authenticate(TOKEN, vec![json!("abc")]).await.unwrap();

    assert!(other.is_authenticated());
}

#[tokio::test]
async fn test_handle_after_shutdown_returns_unavailable() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);

    session.shutdown().await;
    let result = session.restore().await;

    assert!(matches!(result, Err(SessionError::Unavailable)));
}

#[tokio::test]
#[should_panic(expected = "requires the session to be authenticated")]
async fn test_handle_invalidate_unauthenticated_panics_in_caller() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    let _ = session.invalidate().await;
}

#[tokio::test]
#[should_panic(expected = "reserved key")]
async fn test_handle_set_reserved_key_panics_in_caller() {
    let store = Arc::new(EphemeralStore::new());
    let (session, _) = start(&store);
    let _ = session.set("authenticated", json!({})).await;
}
