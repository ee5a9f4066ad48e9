//! Shared vocabulary for Keystone.
//!
//! This crate defines the pieces every other layer speaks in terms of:
//!
//! - **Records** ([`SessionRecord`], [`ContentMap`]): the serializable
//!   shape of a session, as held in memory and as handed to a store.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how a record is turned
//!   into bytes and back by stores that keep serialized copies.
//! - **Events** ([`EventEmitter`], [`NamedEvent`]): listener registration
//!   and removal by event name, used by authenticators and stores to
//!   notify the session controller.
//! - **Errors** ([`ProtocolError`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Layer (above)  ← state machine: authenticate / invalidate / restore
//!     ↕
//! Store Layer            ← persists SessionRecords, reports external updates
//!     ↕
//! Protocol Layer (this crate)  ← records, codecs, event emitters
//! ```

mod codec;
mod error;
mod event;
mod record;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{EventEmitter, ListenerId, NamedEvent};
pub use record::{AUTHENTICATED_KEY, AUTHENTICATOR_KEY, ContentMap, SessionRecord};
