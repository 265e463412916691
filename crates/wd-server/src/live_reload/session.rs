//! Reload session.
//!
//! One session bridges one subscriber outbox to one live client connection.
//! The session ends when its outbox closes, a write fails, or the client goes
//! away; in every case it deregisters before closing the connection.

use std::future::Future;
use std::sync::Arc;

use super::dispatcher::{ReloadDispatcher, Subscription};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Server is going away (shutdown or eviction).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Transport failure on a reload connection.
#[derive(Debug, thiserror::Error)]
#[error("Connection error: {0}")]
pub struct ConnectionError(String);

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What arrived from the client.
#[derive(Debug)]
pub enum Inbound {
    /// Any data or control frame; content is irrelevant.
    Frame,
    /// The client closed the connection.
    Closed,
    /// Reading failed.
    Failed(ConnectionError),
}

/// A duplex connection to a reload client.
pub trait ReloadConnection: Send {
    /// Send one text message.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Wait for the next inbound frame.
    fn recv(&mut self) -> impl Future<Output = Inbound> + Send;

    /// Send a close frame.
    fn send_close(
        &mut self,
        code: u16,
        reason: &'static str,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = Result<(), ConnectionError>> + Send
    where
        Self: Sized;
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Outbox closed: evicted, or the change stream ended.
    OutboxClosed,
    /// Writing an event to the client failed.
    WriteFailed,
    /// The client closed the connection.
    ClientClosed,
    /// Reading from the client failed.
    ReadFailed,
    /// The dispatcher no longer accepts subscribers.
    Rejected,
}

impl CloseReason {
    /// Close frame to send, if any.
    fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            Self::OutboxClosed | Self::Rejected => Some((CLOSE_GOING_AWAY, "going away")),
            Self::WriteFailed | Self::ReadFailed => Some((CLOSE_NORMAL, "")),
            Self::ClientClosed => None,
        }
    }
}

/// Run one reload session to completion.
pub async fn run_session<C: ReloadConnection>(
    mut conn: C,
    dispatcher: Arc<ReloadDispatcher>,
    outbox_capacity: usize,
) -> CloseReason {
    let Subscription { id, mut outbox } = match dispatcher.subscribe(outbox_capacity) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting reload client");
            teardown(conn, CloseReason::Rejected).await;
            return CloseReason::Rejected;
        }
    };
    tracing::info!(subscriber = %id, "Reload client connected");

    let reason = loop {
        tokio::select! {
            event = outbox.recv() => {
                let Some(event) = event else {
                    break CloseReason::OutboxClosed;
                };
                if let Err(e) = conn.send_text(event.path).await {
                    tracing::warn!(subscriber = %id, error = %e, "Failed to send change event");
                    break CloseReason::WriteFailed;
                }
            }
            inbound = conn.recv() => {
                match inbound {
                    Inbound::Frame => {}
                    Inbound::Closed => break CloseReason::ClientClosed,
                    Inbound::Failed(e) => {
                        tracing::debug!(subscriber = %id, error = %e, "Reload connection read failed");
                        break CloseReason::ReadFailed;
                    }
                }
            }
        }
    };

    dispatcher.deregister(&id);
    drop(outbox);
    teardown(conn, reason).await;

    tracing::info!(subscriber = %id, reason = ?reason, "Reload client disconnected");
    reason
}

/// Close handshake then release. Failures here are only logged.
async fn teardown<C: ReloadConnection>(mut conn: C, reason: CloseReason) {
    if let Some((code, text)) = reason.close_frame()
        && let Err(e) = conn.send_close(code, text).await
    {
        tracing::debug!(error = %e, "Close handshake failed");
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Failed to close reload connection");
    }
}
