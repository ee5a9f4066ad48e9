//! Client-side authentication session management for Keystone.
//!
//! This crate answers three questions for an application:
//!
//! 1. **Is the user logged in?** ([`SessionState`], [`SessionController`])
//! 2. **Who logged them in?** The named [`Authenticator`] that produced
//!    the session, looked up in an [`AuthenticatorRegistry`].
//! 3. **What changed?** Lifecycle [`SessionEvent`]s, including changes
//!    made by another tab or by the authenticator itself.
//!
//! # How it fits in the stack
//!
//! ```text
//! UI / Router (above)  ← subscribes to SessionEvent, watches SessionState
//!     ↕
//! Session Layer (this crate)  ← authenticate / invalidate / restore
//!     ↕
//! Store Layer (below)  ← persists SessionRecords, reports external updates
//! ```
//!
//! Use a [`SessionController`] directly when a single task owns the
//! session, or [`spawn_session`] to get a cloneable [`SessionHandle`].

mod actor;
mod authenticator;
mod config;
mod controller;
mod error;
mod state;

pub use actor::{SessionHandle, spawn_session};
pub use authenticator::{Authenticator, AuthenticatorEvent, AuthenticatorRegistry, Credentials};
pub use config::SessionConfig;
pub use controller::{Notification, SessionController};
pub use error::{AuthenticatorError, SessionError};
pub use state::{SessionEvent, SessionState};
