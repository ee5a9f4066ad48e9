//! Named-event emitters.
//!
//! Authenticators and stores need to tell the session controller about
//! things that happen on their own schedule: refreshed credentials, a
//! revoked token, a record rewritten by another tab. They do that through
//! an [`EventEmitter`], which delivers each event to every listener that
//! registered for the event's name.
//!
//! A listener is just the sending half of an unbounded Tokio channel. The
//! emitter never runs listener code itself; it only pushes a copy of the
//! event into each channel. The receiving side decides when to process
//! it, which keeps emitters usable from synchronous code.
//!
//! ```text
//!  authenticator.events().emit(..)
//!        │
//!        ├──→ listener #1 (name = "credentialsUpdated")  ──→ mpsc ──→ controller
//!        └──→ listener #2 (name = "credentialsUpdated")  ──→ mpsc ──→ someone else
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// An event that knows its own name.
///
/// Listeners register by name, so every event type has to be able to say
/// which name it is delivered under.
pub trait NamedEvent: Clone + Send + 'static {
    /// The name listeners register for, e.g. `"credentialsUpdated"`.
    fn name(&self) -> &'static str;
}

/// Identifies one registered listener so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct Listener<E> {
    id: ListenerId,
    name: &'static str,
    sender: mpsc::UnboundedSender<E>,
}

/// Delivers named events to registered channel listeners.
///
/// Cheap to embed: an authenticator or store holds one of these as a plain
/// field and hands out `&EventEmitter` through its trait.
pub struct EventEmitter<E> {
    listeners: Mutex<Vec<Listener<E>>>,
    next_id: AtomicU64,
}

impl<E: NamedEvent> EventEmitter<E> {
    /// Creates an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `sender` for events named `name`.
    pub fn on(&self, name: &'static str, sender: mpsc::UnboundedSender<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Listener { id, name, sender });
        tracing::trace!(%id, event = name, "listener registered");
        id
    }

    /// Removes a single listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if removed {
            tracing::trace!(%id, "listener removed");
        }
        removed
    }

    /// Removes every listener registered for `name`. Returns how many went.
    pub fn off_all(&self, name: &str) -> usize {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| l.name != name);
        before - listeners.len()
    }

    /// Delivers `event` to every listener registered for its name.
    ///
    /// Listeners whose receiving side has been dropped are pruned here.
    /// Returns the number of listeners that received the event.
    pub fn emit(&self, event: E) -> usize {
        let name = event.name();
        let mut delivered = 0;
        self.lock().retain(|l| {
            if l.name != name {
                return true;
            }
            if l.sender.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                tracing::trace!(id = %l.id, event = name, "pruning closed listener");
                false
            }
        });
        delivered
    }

    /// Number of listeners currently registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.lock().iter().filter(|l| l.name == name).count()
    }

    // A listener list is never left half-updated by a panic, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<Listener<E>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: NamedEvent> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len());
        f.debug_struct("EventEmitter")
            .field("listeners", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        Ping(u32),
        Pong,
    }

    impl NamedEvent for Ping {
        fn name(&self) -> &'static str {
            match self {
                Self::Ping(_) => "ping",
                Self::Pong => "pong",
            }
        }
    }

    #[test]
    fn test_emit_delivers_only_to_matching_name() {
        let emitter = EventEmitter::<Ping>::new();
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();
        let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
        emitter.on("ping", ping_tx);
        emitter.on("pong", pong_tx);

        let delivered = emitter.emit(Ping::Ping(3));

        assert_eq!(delivered, 1);
        assert_eq!(ping_rx.try_recv().unwrap(), Ping::Ping(3));
        assert!(pong_rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_listeners_returns_zero() {
        let emitter = EventEmitter::<Ping>::new();
        assert_eq!(emitter.emit(Ping::Pong), 0);
    }

    #[test]
    fn test_off_removes_single_listener() {
        let emitter = EventEmitter::<Ping>::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = emitter.on("ping", tx.clone());
        emitter.on("ping", tx);

        assert!(emitter.off(first));
        assert!(!emitter.off(first), "second removal is a no-op");

        assert_eq!(emitter.emit(Ping::Ping(1)), 1);
        assert_eq!(rx.try_recv().unwrap(), Ping::Ping(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_off_all_removes_every_listener_for_name() {
        let emitter = EventEmitter::<Ping>::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        emitter.on("ping", tx.clone());
        emitter.on("ping", tx.clone());
        emitter.on("pong", tx);

        assert_eq!(emitter.off_all("ping"), 2);
        assert_eq!(emitter.listener_count("ping"), 0);
        assert_eq!(emitter.listener_count("pong"), 1);
    }

    #[test]
    fn test_emit_prunes_closed_listeners() {
        let emitter = EventEmitter::<Ping>::new();
        let (tx, rx) = mpsc::unbounded_channel();
        emitter.on("pong", tx);
        drop(rx);

        assert_eq!(emitter.emit(Ping::Pong), 0);
        assert_eq!(emitter.listener_count("pong"), 0);
    }

    #[test]
    fn test_listener_ids_are_unique() {
        let emitter = EventEmitter::<Ping>::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = emitter.on("ping", tx.clone());
        let b = emitter.on("ping", tx);
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }
}
