use std::sync::Arc;

use keystone::prelude::*;
use rand::Rng;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Trades a username/password pair for a random bearer token.
/// Any password except "hunter2" is wrong.
#[derive(Default)]
struct PasswordAuthenticator {
    events: EventEmitter<AuthenticatorEvent>,
}

impl PasswordAuthenticator {
    /// Pretend a background refresh issued a new token.
    fn refresh(&self, user: &str) -> usize {
        self.events
            .emit(AuthenticatorEvent::CredentialsUpdated(issue(user)))
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self, credentials: Credentials) -> Result<ContentMap, AuthenticatorError> {
        match credentials.as_slice() {
            [Value::String(user), Value::String(password)] if password == "hunter2" => Ok(issue(user)),
            [_, _] => Err(AuthenticatorError::Rejected("wrong password".into())),
            _ => Err(AuthenticatorError::Rejected("expected a username and a password".into())),
        }
    }

    async fn restore(&self, content: ContentMap) -> Result<ContentMap, AuthenticatorError> {
        match content.get("token") {
            Some(Value::String(token)) if token.len() == 32 => Ok(content),
            _ => Err(AuthenticatorError::Expired),
        }
    }

    fn events(&self) -> &EventEmitter<AuthenticatorEvent> {
        &self.events
    }
}

/// 32 hex chars of randomness.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn issue(user: &str) -> ContentMap {
    let mut content = ContentMap::new();
    content.insert("user".into(), json!(user));
    content.insert("token".into(), json!(generate_token()));
    content
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

const PASSWORD: &str = "authenticator:password";

async fn settle(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Option<SessionEvent> {
    tokio::time::timeout(std::time::Duration::from_millis(100), events.recv())
        .await
        .ok()
        .and_then(Result::ok)
}

#[tokio::main]
async fn main() -> Result<(), KeystoneError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keystone_session=debug,token_login=info".into()),
        )
        .init();

    let authenticator = Arc::new(PasswordAuthenticator::default());
    let store = Arc::new(EphemeralStore::new());
    let registry = AuthenticatorRegistry::new().with(PASSWORD, authenticator.clone());
    let session = spawn_session(SessionController::new(registry, store.clone(), SessionConfig::default()));
    let mut events = session.subscribe();

    if let Err(error) = session.restore().await {
        tracing::info!(%error, "starting unauthenticated");
    }

    if let Err(error) = session.authenticate(PASSWORD, vec![json!("ada"), json!("guess")]).await {
        tracing::info!(%error, "login refused");
    }

    session.authenticate(PASSWORD, vec![json!("ada"), json!("hunter2")]).await?;
    tracing::info!(event = ?settle(&mut events).await, token = ?session.state().authenticated().get("token"), "logged in");

    let mut watch = session.watch();
    watch.mark_unchanged();
    authenticator.refresh("ada");
    if watch.changed().await.is_ok() {
        tracing::info!(token = ?watch.borrow().authenticated().get("token"), "token refreshed");
    }

    // Another tab logs out.
    store.simulate_external_update(SessionRecord::new());
    tracing::info!(event = ?settle(&mut events).await, "logged out elsewhere");

    session.authenticate(PASSWORD, vec![json!("ada"), json!("hunter2")]).await?;
    session.invalidate().await?;
    tracing::info!(event = ?settle(&mut events).await, persisted = ?store.restore(), "logged out");

    session.shutdown().await;
    Ok(())
}
