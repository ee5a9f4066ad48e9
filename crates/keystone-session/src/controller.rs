//! The session controller: the state machine at the heart of Keystone.
//!
//! It ties together three collaborators:
//!
//! - an [`AuthenticatorRegistry`] to find the authenticator for a name,
//! - a [`SessionStore`] to persist the record and report external changes,
//! - subscribers, who get [`SessionState`] snapshots and [`SessionEvent`]s.
//!
//! ```text
//!                 authenticate() / invalidate() / restore()
//!                                  │
//!                                  ▼
//!   Authenticator ◄──────── SessionController ────────► SessionStore
//!        │  credentialsUpdated        │        persist()      │
//!        └─ credentialsInvalidated ──►│◄──── externalUpdate ──┘
//!                                     ▼
//!                    watch<SessionState> + broadcast<SessionEvent>
//! ```
//!
//! # Transitions
//!
//! Every state change goes through one of two internal transitions:
//!
//! - **setup**: become authenticated with a given authenticator and
//!   content. Binds the controller to that authenticator's events.
//! - **clear**: become unauthenticated. Unbinds from the authenticator.
//!
//! Both finish the whole change (fields, binding, persisting, publishing
//! the snapshot) before emitting an event. Both emit only on an actual
//! edge: setup fires `AuthenticationSucceeded` only when the session was
//! unauthenticated before, clear fires `InvalidationSucceeded` only when
//! it was authenticated before.
//!
//! # Concurrency note
//!
//! The controller is a plain `&mut self` state machine. It does not guard
//! against a second operation being started while one is awaiting its
//! authenticator; the borrow checker already rules that out for direct
//! use, and [`spawn_session`](crate::spawn_session) serializes calls made
//! through a handle.

use std::sync::Arc;

use keystone_protocol::{AUTHENTICATED_KEY, ContentMap, ListenerId, SessionRecord};
use keystone_store::{SessionStore, StoreEvent};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    Authenticator, AuthenticatorEvent, AuthenticatorRegistry, Credentials, SessionConfig,
    SessionError, SessionEvent, SessionState,
};

/// Something an authenticator or the store reported that the controller
/// has not processed yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Fired by the currently bound authenticator.
    Authenticator(AuthenticatorEvent),
    /// The store's record was rewritten out of band.
    ExternalUpdate(SessionRecord),
}

/// The controller's listeners on the authenticator backing the session.
///
/// Every binding gets its own channel. Dropping the binding drops the
/// receiver, so anything a stale authenticator queued is discarded with it.
struct Binding {
    name: String,
    authenticator: Arc<dyn Authenticator>,
    updated: ListenerId,
    invalidated: ListenerId,
    events: mpsc::UnboundedReceiver<AuthenticatorEvent>,
}

/// Client-side authentication session state machine.
///
/// Invariant: `state.is_authenticated` is `true` exactly when `binding`
/// is `Some`, and then `binding.name == state.authenticator`.
pub struct SessionController {
    registry: AuthenticatorRegistry,
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    state: SessionState,
    binding: Option<Binding>,
    store_listener: ListenerId,
    store_updates: mpsc::UnboundedReceiver<StoreEvent>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Creates an unauthenticated controller with an empty record and
    /// starts listening for the store's external updates.
    ///
    /// Nothing is read from the store yet; call [`restore`](Self::restore)
    /// for that.
    pub fn new(
        registry: AuthenticatorRegistry,
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
    ) -> Self {
        let config = config.validated();
        let (updates_tx, store_updates) = mpsc::unbounded_channel();
        let store_listener = store.events().on(StoreEvent::EXTERNAL_UPDATE, updates_tx);
        let state = SessionState::default();
        let (state_tx, _) = watch::channel(state.clone());
        let (events, _) = broadcast::channel(config.event_capacity);

        Self {
            registry,
            store,
            config,
            state,
            binding: None,
            store_listener,
            store_updates,
            state_tx,
            events,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated
    }

    /// Name of the authenticator backing the session, if any.
    pub fn authenticator(&self) -> Option<&str> {
        self.state.authenticator.as_deref()
    }

    pub fn content(&self) -> &SessionRecord {
        &self.state.content
    }

    /// The authenticator's content for the active session (empty when
    /// unauthenticated).
    pub fn authenticated(&self) -> &ContentMap {
        &self.state.content.authenticated
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn attempted_transition(&self) -> Option<&Value> {
        self.state.attempted_transition.as_ref()
    }

    /// Records where the user was headed. Not persisted.
    pub fn set_attempted_transition(&mut self, transition: Option<Value>) {
        self.state.attempted_transition = transition;
        self.publish();
    }

    /// Reads a free-form session data entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.content.get(key)
    }

    /// Writes a free-form session data entry and persists the record.
    ///
    /// # Panics
    /// Panics if `key` is `"authenticated"`. That entry belongs to the
    /// authenticator and only changes through authenticate, invalidate
    /// and restore.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        assert!(
            key != AUTHENTICATED_KEY,
            "\"{AUTHENTICATED_KEY}\" is a reserved key used by the session controller!"
        );
        self.state.content.data.insert(key, value);
        self.update_store();
    }

    /// A receiver that always holds the latest [`SessionState`].
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Subscribes to lifecycle [`SessionEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    // -- Operations -------------------------------------------------------

    /// Authenticates with the authenticator registered as `authenticator`.
    ///
    /// On success the session becomes authenticated with whatever content
    /// the authenticator returned, and `AuthenticationSucceeded` fires if
    /// the session was not authenticated before. On failure the session is
    /// cleared without any event (nothing was ever authenticated by this
    /// call) and the authenticator's error is returned.
    ///
    /// # Errors
    /// - [`SessionError::UnknownAuthenticator`]: nothing registered under
    ///   that name; the session is untouched.
    /// - [`SessionError::Authenticator`]: the authenticator refused.
    ///
    /// # Panics
    /// Panics if `authenticator` is empty.
    pub async fn authenticate(
        &mut self,
        authenticator: &str,
        credentials: Credentials,
    ) -> Result<(), SessionError> {
        assert!(
            !authenticator.is_empty(),
            "SessionController::authenticate requires the authenticator to be specified!"
        );
        let instance = self.registry.lookup(authenticator)?;

        match instance.authenticate(credentials).await {
            Ok(content) => {
                self.setup(authenticator.to_owned(), instance, content, true);
                Ok(())
            }
            Err(error) => {
                tracing::debug!(authenticator, %error, "authentication rejected");
                self.clear(false);
                Err(error.into())
            }
        }
    }

    /// Ends the session through the authenticator that backs it.
    ///
    /// On success the session is cleared and `InvalidationSucceeded` fires.
    /// On failure the session is left exactly as it was,
    /// `InvalidationFailed` fires with the error, and the same error is
    /// returned.
    ///
    /// # Errors
    /// [`SessionError::Authenticator`] if the authenticator refused.
    ///
    /// # Panics
    /// Panics if the session is not authenticated.
    pub async fn invalidate(&mut self) -> Result<(), SessionError> {
        let (name, instance) = match (&self.binding, self.state.is_authenticated) {
            (Some(binding), true) => (binding.name.clone(), Arc::clone(&binding.authenticator)),
            _ => panic!("SessionController::invalidate requires the session to be authenticated!"),
        };

        match instance.invalidate(self.state.content.authenticated.clone()).await {
            Ok(()) => {
                self.clear(true);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(authenticator = %name, %error, "session invalidation failed");
                self.emit(SessionEvent::InvalidationFailed(error.clone()));
                Err(error.into())
            }
        }
    }

    /// Resumes the session persisted in the store, if there is one.
    ///
    /// Restoration is silent: no event fires either way. An `Err` simply
    /// means the application starts unauthenticated, which is why an empty
    /// store yields [`SessionError::NothingToRestore`] rather than `Ok`.
    ///
    /// # Errors
    /// - [`SessionError::NothingToRestore`]: the record names no
    ///   authenticator.
    /// - [`SessionError::UnknownAuthenticator`]: the named authenticator is
    ///   not registered; the session is untouched.
    /// - [`SessionError::Authenticator`]: the authenticator refused to
    ///   restore. The rest of the record is still adopted.
    pub async fn restore(&mut self) -> Result<(), SessionError> {
        let mut record = self.store.restore();

        let Some(name) = record.take_authenticator() else {
            record.authenticated = ContentMap::new();
            self.state.content = record;
            self.clear(false);
            return Err(SessionError::NothingToRestore);
        };

        let instance = self.registry.lookup(&name)?;
        match instance.restore(record.authenticated.clone()).await {
            Ok(content) => {
                self.state.content = record;
                self.setup(name, instance, content, false);
                Ok(())
            }
            Err(error) => {
                tracing::debug!(
                    authenticator = %name,
                    %error,
                    "the authenticator rejected to restore the session - invalidating"
                );
                self.state.content = record;
                self.clear(false);
                Err(error.into())
            }
        }
    }

    // -- Notifications ----------------------------------------------------

    /// Waits for the next store or authenticator notification.
    ///
    /// Returns `None` once neither source can produce anything more (the
    /// store dropped its listeners and no authenticator is bound).
    pub async fn next_notification(&mut self) -> Option<Notification> {
        let bound = self.binding.as_mut().map(|b| &mut b.events);
        tokio::select! {
            Some(StoreEvent::ExternalUpdate(record)) = self.store_updates.recv() => {
                Some(Notification::ExternalUpdate(record))
            }
            Some(event) = recv_bound(bound) => Some(Notification::Authenticator(event)),
            else => None,
        }
    }

    /// Applies one notification returned by
    /// [`next_notification`](Self::next_notification).
    pub async fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Authenticator(event) => self.handle_authenticator_event(event),
            Notification::ExternalUpdate(record) => self.handle_external_update(record).await,
        }
    }

    /// Applies every notification that is already queued, without
    /// waiting for new ones. Returns how many were applied.
    pub async fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(notification) = self.try_next_notification() {
            self.handle_notification(notification).await;
            processed += 1;
        }
        processed
    }

    fn try_next_notification(&mut self) -> Option<Notification> {
        if let Some(binding) = self.binding.as_mut() {
            if let Ok(event) = binding.events.try_recv() {
                return Some(Notification::Authenticator(event));
            }
        }
        match self.store_updates.try_recv() {
            Ok(StoreEvent::ExternalUpdate(record)) => Some(Notification::ExternalUpdate(record)),
            Err(_) => None,
        }
    }

    fn handle_authenticator_event(&mut self, event: AuthenticatorEvent) {
        let Some(binding) = self.binding.as_ref() else {
            tracing::trace!(?event, "ignoring event from unbound authenticator");
            return;
        };
        match event {
            AuthenticatorEvent::CredentialsUpdated(content) => {
                let name = binding.name.clone();
                let instance = Arc::clone(&binding.authenticator);
                tracing::debug!(authenticator = %name, "credentials updated");
                self.setup(name, instance, content, false);
            }
            AuthenticatorEvent::CredentialsInvalidated => {
                tracing::debug!(authenticator = %binding.name, "credentials invalidated");
                self.clear(true);
            }
        }
    }

    /// Re-derives the session from a record another process wrote.
    ///
    /// Unlike [`restore`](Self::restore) this is a live change the rest of
    /// the application must hear about, so setup and clear emit events.
    async fn handle_external_update(&mut self, mut record: SessionRecord) {
        let Some(name) = record.take_authenticator() else {
            self.state.content = record;
            self.clear(true);
            return;
        };

        let instance = match self.registry.lookup(&name) {
            Ok(instance) => instance,
            Err(error) => {
                tracing::warn!(%error, "ignoring external session update");
                return;
            }
        };
        match instance.restore(record.authenticated.clone()).await {
            Ok(content) => {
                self.state.content = record;
                self.setup(name, instance, content, true);
            }
            Err(error) => {
                tracing::debug!(
                    authenticator = %name,
                    %error,
                    "the authenticator rejected to restore the session - invalidating"
                );
                self.state.content = record;
                self.clear(true);
            }
        }
    }

    // -- Transitions ------------------------------------------------------

    fn setup(
        &mut self,
        name: String,
        instance: Arc<dyn Authenticator>,
        content: ContentMap,
        trigger: bool,
    ) {
        let trigger = trigger && !self.state.is_authenticated;

        self.bind_events(&name, instance);
        self.state.is_authenticated = true;
        self.state.authenticator = Some(name);
        self.state.content.authenticated = content;
        self.update_store();

        if trigger {
            tracing::info!(authenticator = ?self.state.authenticator, "session authenticated");
            self.emit(SessionEvent::AuthenticationSucceeded);
        }
    }

    fn clear(&mut self, trigger: bool) {
        let trigger = trigger && self.state.is_authenticated;

        self.unbind_events();
        self.state.is_authenticated = false;
        self.state.authenticator = None;
        self.state.content.authenticated = ContentMap::new();
        self.update_store();

        if trigger {
            tracing::info!("session invalidated");
            self.emit(SessionEvent::InvalidationSucceeded);
        }
    }

    /// Makes `instance` the only authenticator the controller listens to.
    ///
    /// Binding the authenticator that is already bound keeps its existing
    /// listeners, so repeated setups never stack duplicates.
    fn bind_events(&mut self, name: &str, instance: Arc<dyn Authenticator>) {
        if self.binding.as_ref().is_some_and(|b| b.name == name) {
            return;
        }
        self.unbind_events();

        let (tx, events) = mpsc::unbounded_channel();
        let emitter = instance.events();
        let updated = emitter.on(AuthenticatorEvent::CREDENTIALS_UPDATED, tx.clone());
        let invalidated = emitter.on(AuthenticatorEvent::CREDENTIALS_INVALIDATED, tx);
        tracing::trace!(authenticator = name, "bound to authenticator events");

        self.binding = Some(Binding {
            name: name.to_owned(),
            authenticator: instance,
            updated,
            invalidated,
            events,
        });
    }

    fn unbind_events(&mut self) {
        if let Some(binding) = self.binding.take() {
            let emitter = binding.authenticator.events();
            emitter.off(binding.updated);
            emitter.off(binding.invalidated);
            tracing::trace!(authenticator = %binding.name, "unbound from authenticator events");
        }
    }

    /// Persists the record (tagged with the authenticator name while
    /// authenticated) and publishes the new snapshot.
    fn update_store(&mut self) {
        let record = match &self.state.authenticator {
            Some(name) => self.state.content.tagged_with(name),
            None => self.state.content.clone(),
        };
        self.store.persist(&record);
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the event simply has no audience.
        if self.events.send(event).is_err() {
            tracing::trace!("no lifecycle subscribers");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.store.events().off(self.store_listener);
        self.unbind_events();
    }
}

async fn recv_bound(
    events: Option<&mut mpsc::UnboundedReceiver<AuthenticatorEvent>>,
) -> Option<AuthenticatorEvent> {
    match events {
        Some(events) => events.recv().await,
        None => None,
    }
}

// =========================================================================
// Tests
// =========================================================================
