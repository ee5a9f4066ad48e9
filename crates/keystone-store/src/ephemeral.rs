//! In-memory session store.
//!
//! Useful for tests and for applications that deliberately don't want a
//! session to outlive the process. The record is kept serialized, so a
//! caller of [`SessionStore::restore`] always gets its own fresh copy.

use std::sync::{Mutex, PoisonError};

use keystone_protocol::{Codec, EventEmitter, JsonCodec, SessionRecord};

use crate::{SessionStore, StoreEvent};

/// A [`SessionStore`] that keeps the record in memory.
///
/// Generic over the [`Codec`] used for the stored bytes; the default is
/// JSON, which is what browser-style stores keep too.
#[derive(Debug)]
pub struct EphemeralStore<C: Codec = JsonCodec> {
    data: Mutex<Option<Vec<u8>>>,
    codec: C,
    events: EventEmitter<StoreEvent>,
}

impl EphemeralStore<JsonCodec> {
    /// Creates an empty store using [`JsonCodec`].
    pub fn new() -> Self {
        Self::with_codec(JsonCodec)
    }
}

impl Default for EphemeralStore<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> EphemeralStore<C> {
    /// Creates an empty store with a custom codec.
    pub fn with_codec(codec: C) -> Self {
        Self {
            data: Mutex::new(None),
            codec,
            events: EventEmitter::new(),
        }
    }

    /// Creates a store that already holds `record`, as if a previous run
    /// had persisted it.
    pub fn seeded(codec: C, record: &SessionRecord) -> Self {
        let store = Self::with_codec(codec);
        store.persist(record);
        store
    }

    /// Overwrites the stored record and announces it as an external update.
    ///
    /// This is what another tab writing to shared storage looks like from
    /// this process's point of view. Returns the number of listeners that
    /// were notified.
    pub fn simulate_external_update(&self, record: SessionRecord) -> usize {
        self.persist(&record);
        tracing::debug!("ephemeral store updated externally");
        self.events.emit(StoreEvent::ExternalUpdate(record))
    }

    /// Returns the raw stored bytes, if anything was persisted.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<C: Codec> SessionStore for EphemeralStore<C> {
    fn restore(&self) -> SessionRecord {
        let Some(bytes) = self.raw() else {
            return SessionRecord::new();
        };
        match self.codec.decode(&bytes) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(%error, "stored session is unreadable, starting empty");
                SessionRecord::new()
            }
        }
    }

    fn persist(&self, record: &SessionRecord) {
        match self.codec.encode(record) {
            Ok(bytes) => {
                *self.data.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
            }
            Err(error) => {
                tracing::warn!(%error, "failed to encode session, keeping previous copy");
            }
        }
    }

    fn events(&self) -> &EventEmitter<StoreEvent> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn tagged_record() -> SessionRecord {
        let mut record = SessionRecord::new();
        record.authenticated.insert("token".into(), json!("t"));
        record.tagged_with("authenticator:test")
    }

    #[test]
    fn test_restore_empty_store_returns_empty_record() {
        let store = EphemeralStore::new();
        assert_eq!(store.restore(), SessionRecord::new());
        assert!(store.raw().is_none());
    }

    #[test]
    fn test_persist_then_restore_returns_equal_copy() {
        let store = EphemeralStore::new();
        let record = tagged_record();

        store.persist(&record);

        assert_eq!(store.restore(), record);
    }

    #[test]
    fn test_restore_returns_independent_copies() {
        let store = EphemeralStore::seeded(JsonCodec, &tagged_record());

        let mut first = store.restore();
        first.authenticated.clear();

        assert_eq!(store.restore(), tagged_record());
    }

    #[test]
    fn test_restore_unreadable_bytes_returns_empty_record() {
        let store = EphemeralStore::new();
        *store.data.lock().unwrap() = Some(b"not json".to_vec());

        assert_eq!(store.restore(), SessionRecord::new());
    }

    #[test]
    fn test_simulate_external_update_notifies_and_persists() {
        let store = EphemeralStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.events().on(StoreEvent::EXTERNAL_UPDATE, tx);

        let delivered = store.simulate_external_update(tagged_record());

        assert_eq!(delivered, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::ExternalUpdate(tagged_record())
        );
        assert_eq!(store.restore(), tagged_record());
    }

    #[test]
    fn test_persist_does_not_notify_listeners() {
        // Only out-of-band changes are announced; our own writes are not.
        let store = EphemeralStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.events().on(StoreEvent::EXTERNAL_UPDATE, tx);

        store.persist(&tagged_record());

        assert!(rx.try_recv().is_err());
    }
}
