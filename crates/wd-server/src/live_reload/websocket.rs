//! WebSocket endpoint for live reload.
//!
//! Each upgraded connection becomes one reload session.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::session::{ConnectionError, Inbound, ReloadConnection, run_session};
use crate::state::AppState;

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        run_session(socket, Arc::clone(&state.dispatcher), state.outbox_capacity).await;
    })
}

impl From<axum::Error> for ConnectionError {
    fn from(e: axum::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl ReloadConnection for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Inbound {
        match WebSocket::recv(self).await {
            Some(Ok(Message::Close(_))) | None => Inbound::Closed,
            Some(Ok(_)) => Inbound::Frame,
            Some(Err(e)) => Inbound::Failed(e.into()),
        }
    }

    async fn send_close(&mut self, code: u16, reason: &'static str) -> Result<(), ConnectionError> {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        };
        self.send(Message::Close(Some(frame))).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), ConnectionError> {
        // The underlying stream is shut down on drop
        drop(self);
        Ok(())
    }
}
