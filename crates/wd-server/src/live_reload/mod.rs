//! Live reload: change fan-out and per-client sessions.

mod dispatcher;
mod session;
mod websocket;

pub use dispatcher::{
    DispatchError, DispatcherState, Outbox, ReloadDispatcher, SubscriberId, Subscription,
};
pub use session::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, CloseReason, ConnectionError, Inbound, ReloadConnection,
    run_session,
};
pub(crate) use websocket::ws_handler;
