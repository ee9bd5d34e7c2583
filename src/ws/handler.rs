//! WebSocket upgrade handler for the signaling relay

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::signaling::room::PeerTx;
use crate::signaling::{Membership, RoomRegistry, SignalError};
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Messages buffered for one socket's writer task
const OUTBOUND_QUEUE: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New signaling connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMsg>(OUTBOUND_QUEUE);

    // Writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = PeerRateLimiter::new(state.config.signal_rate_limit);
    let mut session = SignalSession {
        conn_id,
        rooms: &state.rooms,
        tx,
        membership: None,
    };

    // Reader loop: WebSocket -> room registry
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(conn_id = %conn_id, "Rate limited signaling message");
                    session.reply_error(&SignalError::RateLimited);
                    continue;
                }
                session.handle_text(&text);
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.leave();
    drop(session);
    writer_handle.abort();
    info!(conn_id = %conn_id, "Signaling connection closed");
}

/// Per-socket dispatch state
struct SignalSession<'a> {
    conn_id: Uuid,
    rooms: &'a RoomRegistry,
    tx: PeerTx,
    membership: Option<Membership>,
}

impl SignalSession<'_> {
    fn handle_text(&mut self, text: &str) {
        let msg = match serde_json::from_str::<ClientMsg>(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %self.conn_id, error = %e, "Failed to parse client message");
                self.reply_error(&SignalError::BadMessage("invalid JSON".to_string()));
                return;
            }
        };

        if let Err(e) = self.dispatch(msg) {
            debug!(conn_id = %self.conn_id, error = %e, "Signaling request rejected");
            self.reply_error(&e);
        }
    }

    fn dispatch(&mut self, msg: ClientMsg) -> Result<(), SignalError> {
        match msg {
            ClientMsg::CreateRoom { name, room_code } => {
                self.leave();
                let membership =
                    self.rooms
                        .create_room(&name, room_code.as_deref(), self.tx.clone())?;
                self.membership = Some(membership);
            }
            ClientMsg::JoinRoom { name, room_code } => {
                self.leave();
                let membership = self.rooms.join_room(&name, &room_code, self.tx.clone())?;
                self.membership = Some(membership);
            }
            ClientMsg::Signal {
                room_code,
                to,
                data,
            } => {
                let from = self
                    .membership
                    .as_ref()
                    .filter(|m| m.room_code == room_code)
                    .map(|m| m.peer_id.as_str());
                self.rooms.relay(&room_code, from, &to, data)?;
            }
        }
        Ok(())
    }

    fn reply_error(&self, e: &SignalError) {
        if self.tx.try_send(ServerMsg::error(e.to_string())).is_err() {
            debug!(conn_id = %self.conn_id, "Could not queue error reply");
        }
    }

    fn leave(&mut self) {
        if let Some(membership) = self.membership.take() {
            self.rooms.leave(&membership);
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
