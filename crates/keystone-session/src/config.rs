//! Session controller configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the session controller and its actor.
///
/// Deserializable so it can sit inside an application's own config file;
/// missing fields fall back to [`SessionConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How many lifecycle events a slow subscriber may fall behind before
    /// it starts missing them.
    ///
    /// Default: 64.
    pub event_capacity: usize,

    /// Size of the actor's command queue. Callers wait once it is full.
    ///
    /// Default: 32.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
            command_buffer: 32,
        }
    }
}

impl SessionConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Tokio channels cannot have a capacity of zero, so zeros are raised
    /// to one. Called automatically by
    /// [`SessionController::new`](crate::SessionController::new).
    pub fn validated(mut self) -> Self {
        if self.event_capacity == 0 {
            tracing::warn!("event_capacity of 0 is not allowed, using 1");
            self.event_capacity = 1;
        }
        if self.command_buffer == 0 {
            tracing::warn!("command_buffer of 0 is not allowed, using 1");
            self.command_buffer = 1;
        }
        self
    }
}
