//! Session store abstraction for Keystone.
//!
//! Provides the [`SessionStore`] trait that abstracts over where a session
//! record lives between page loads (cookies, local storage, a file, ...).
//! Keystone itself only ships an in-memory backend; real backends live
//! with the application.
//!
//! # Feature Flags
//!
//! - `ephemeral` (default): [`EphemeralStore`], an in-memory store that
//!   forgets everything when dropped

#[cfg(feature = "ephemeral")]
mod ephemeral;

#[cfg(feature = "ephemeral")]
pub use ephemeral::EphemeralStore;

use keystone_protocol::{EventEmitter, NamedEvent, SessionRecord};

/// Notifications a store sends to whoever listens on its emitter.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The persisted record changed through some channel other than this
    /// process's own [`SessionStore::persist`] call, e.g. another browser
    /// tab logging out.
    ExternalUpdate(SessionRecord),
}

impl StoreEvent {
    /// Listener name for [`StoreEvent::ExternalUpdate`].
    pub const EXTERNAL_UPDATE: &'static str = "externalUpdate";
}

impl NamedEvent for StoreEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::ExternalUpdate(_) => Self::EXTERNAL_UPDATE,
        }
    }
}

/// Persists and restores the session record.
///
/// Both operations are synchronous: a store is expected to be a thin
/// wrapper over local storage. Failures to read or write are the store's
/// own business; it should log them and fall back to an empty record
/// rather than surface them to the session controller.
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the last persisted record, or an empty one if there is none.
    fn restore(&self) -> SessionRecord;

    /// Replaces the persisted record with a copy of `record`.
    fn persist(&self, record: &SessionRecord);

    /// The emitter that fires [`StoreEvent::ExternalUpdate`].
    fn events(&self) -> &EventEmitter<StoreEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_event_name_is_external_update() {
        let event = StoreEvent::ExternalUpdate(SessionRecord::new());
        assert_eq!(event.name(), "externalUpdate");
    }
}
