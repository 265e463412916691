//! Application state.
//!
//! Shared state for all request handlers.

use std::sync::Arc;

use crate::live_reload::ReloadDispatcher;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Fan-out for change events.
    pub(crate) dispatcher: Arc<ReloadDispatcher>,
    /// Events buffered per client before it is disconnected.
    pub(crate) outbox_capacity: usize,
}
