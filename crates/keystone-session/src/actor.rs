//! Session actor: runs a [`SessionController`] in its own Tokio task.
//!
//! The controller is a `&mut self` state machine, which is awkward to
//! share between a router, a UI, and background work. The actor owns it
//! instead and talks to everyone else through channels:
//!
//! - commands come in on an mpsc channel, each with a `oneshot` reply,
//! - state goes out on a `watch` channel,
//! - lifecycle events go out on a `broadcast` channel.
//!
//! The actor handles one command at a time, which also serializes
//! concurrent `authenticate`/`invalidate`/`restore` calls. Between
//! commands it applies store external updates and authenticator events.

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{Credentials, SessionController, SessionError, SessionEvent, SessionState};

/// Commands sent to the session actor through its channel.
pub(crate) enum SessionCommand {
    Authenticate {
        authenticator: String,
        credentials: Credentials,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Invalidate {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Restore {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Set {
        key: String,
        value: Value,
        reply: oneshot::Sender<()>,
    },
    SetAttemptedTransition {
        transition: Option<Value>,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a running session actor.
///
/// Cheap to clone; every clone talks to the same session.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Authenticates with the authenticator registered as `authenticator`.
    ///
    /// See [`SessionController::authenticate`].
    ///
    /// # Panics
    /// Panics (in the caller) if `authenticator` is empty.
    pub async fn authenticate(
        &self,
        authenticator: impl Into<String>,
        credentials: Credentials,
    ) -> Result<(), SessionError> {
        let authenticator = authenticator.into();
        assert!(
            !authenticator.is_empty(),
            "SessionHandle::authenticate requires the authenticator to be specified!"
        );
        self.request(|reply| SessionCommand::Authenticate {
            authenticator,
            credentials,
            reply,
        })
        .await?
    }

    /// Ends the session. See [`SessionController::invalidate`].
    ///
    /// # Errors
    /// Besides the controller's errors, returns
    /// [`SessionError::NotAuthenticated`] if the session stopped being
    /// authenticated before the actor got to this request.
    ///
    /// # Panics
    /// Panics (in the caller) if the latest published state is
    /// unauthenticated.
    pub async fn invalidate(&self) -> Result<(), SessionError> {
        assert!(
            self.state.borrow().is_authenticated,
            "SessionHandle::invalidate requires the session to be authenticated!"
        );
        self.request(|reply| SessionCommand::Invalidate { reply }).await?
    }

    /// Resumes the persisted session. See [`SessionController::restore`].
    pub async fn restore(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Restore { reply }).await?
    }

    /// Writes a free-form session data entry. See [`SessionController::set`].
    ///
    /// # Panics
    /// Panics (in the caller) if `key` is `"authenticated"`.
    pub async fn set(&self, key: impl Into<String>, value: Value) -> Result<(), SessionError> {
        let key = key.into();
        assert!(
            key != keystone_protocol::AUTHENTICATED_KEY,
            "\"authenticated\" is a reserved key used by the session controller!"
        );
        self.request(|reply| SessionCommand::Set { key, value, reply }).await
    }

    /// Records where the user was headed before being sent to log in.
    pub async fn set_attempted_transition(
        &self,
        transition: Option<Value>,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetAttemptedTransition { transition, reply })
            .await
    }

    /// The latest published state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// A receiver that always holds the latest [`SessionState`].
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Subscribes to lifecycle [`SessionEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Asks the actor to stop. Pending commands queued before this one are
    /// still handled.
    pub async fn shutdown(&self) {
        if self.sender.send(SessionCommand::Shutdown).await.is_err() {
            tracing::trace!("session actor already stopped");
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

/// Spawns a Tokio task that owns `controller` and returns a handle to it.
///
/// Must be called from within a Tokio runtime. The task runs until
/// [`SessionHandle::shutdown`] is called or every handle is dropped.
pub fn spawn_session(controller: SessionController) -> SessionHandle {
    let (sender, commands) = mpsc::channel(controller.config().command_buffer);
    let handle = SessionHandle {
        sender,
        state: controller.watch(),
        events: controller.event_sender(),
    };
    tokio::spawn(run_session(controller, commands));
    handle
}

/// The actor's main loop.
async fn run_session(
    mut controller: SessionController,
    mut commands: mpsc::Receiver<SessionCommand>,
) {
    tracing::debug!("session actor started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Shutdown) | None => break,
                Some(command) => handle_command(&mut controller, command).await,
            },
            Some(notification) = controller.next_notification() => {
                controller.handle_notification(notification).await;
            }
        }
    }
    tracing::debug!("session actor stopped");
}

async fn handle_command(controller: &mut SessionController, command: SessionCommand) {
    match command {
        SessionCommand::Authenticate {
            authenticator,
            credentials,
            reply,
        } => {
            let result = controller.authenticate(&authenticator, credentials).await;
            let _ = reply.send(result);
        }
        SessionCommand::Invalidate { reply } => {
            // The caller checked against a snapshot that may be stale by
            // now; the controller itself would panic.
            let result = if controller.is_authenticated() {
                controller.invalidate().await
            } else {
                Err(SessionError::NotAuthenticated)
            };
            let _ = reply.send(result);
        }
        SessionCommand::Restore { reply } => {
            let result = controller.restore().await;
            let _ = reply.send(result);
        }
        SessionCommand::Set { key, value, reply } => {
            controller.set(key, value);
            let _ = reply.send(());
        }
        SessionCommand::SetAttemptedTransition { transition, reply } => {
            controller.set_attempted_transition(transition);
            let _ = reply.send(());
        }
        SessionCommand::Shutdown => {}
    }
}
