use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    auth::Identity,
    dto::ws::{ClientCommand, ServerMessage},
    services::match_service::{self, ConnectionSession},
    state::SharedState,
};

/// Handle the full lifecycle of one authenticated player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut session = ConnectionSession::new(identity, outbound_tx.clone());
    info!(
        connection = %session.id(),
        user_id = %session.identity().user_id,
        "player connected"
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection = %session.id(), payload = %text, "received player message");
                if !handle_text(&state, &mut session, text.as_str()).await {
                    info!(connection = %session.id(), "writer closed, terminating");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection = %session.id(), "player closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                session.reply(&ServerMessage::error("binary frames are not supported"));
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %session.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    match_service::leave(&state, &mut session).await;
    info!(
        connection = %session.id(),
        user_id = %session.identity().user_id,
        "player disconnected"
    );

    drop(session);
    finalize(writer_task, outbound_tx).await;
}

/// Decode and run one text frame. Rejections are answered to the caller
/// only. Returns `false` once the caller's writer is gone.
pub async fn handle_text(state: &SharedState, session: &mut ConnectionSession, text: &str) -> bool {
    let command = match ClientCommand::from_json_str(text) {
        Ok(command) => command,
        Err(err) => {
            warn!(connection = %session.id(), error = %err, "failed to parse player message");
            return session.reply(&ServerMessage::error(format!("invalid command: {err}")));
        }
    };

    if let Err(message) = command.check_shape() {
        return session.reply(&ServerMessage::error(format!("invalid input: {message}")));
    }

    let kind = command.kind();
    let code = command.code().to_owned();
    match match_service::dispatch(state, session, command).await {
        Ok(()) => true,
        Err(err) => {
            if err.is_infrastructure() {
                warn!(
                    connection = %session.id(),
                    command = kind,
                    code = %code,
                    error = %err,
                    "command failed on infrastructure"
                );
            } else {
                debug!(
                    connection = %session.id(),
                    command = kind,
                    code = %code,
                    error = %err,
                    "command rejected"
                );
            }
            session.reply(&ServerMessage::error(err.client_message()))
        }
    }
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `false` only when the writer channel is closed. Serialization
/// failures are logged and reported as sent, since retrying cannot help.
pub fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
    context: &str,
) -> bool
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, context, "failed to serialize message `{value:?}`");
            return true;
        }
    };

    tx.send(Message::Text(payload.into())).is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_writers_are_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(send_message_to_websocket(&tx, &ServerMessage::error("x"), "test"));
        drop(rx);
        assert!(!send_message_to_websocket(&tx, &ServerMessage::error("x"), "test"));
    }
}
