//! Group-addressed channels: the live connections attached to each match.

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{services::websocket_service::send_message_to_websocket, state::game::ConnectionId};

#[derive(Clone, Debug)]
/// Handle used to push messages to one connected player.
pub struct ClientConnection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Authenticated owner of the connection.
    pub user_id: String,
    /// Writer queue of the socket.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Connections attached to each match code.
#[derive(Debug, Default)]
pub struct GroupHub {
    groups: DashMap<String, DashMap<ConnectionId, ClientConnection>>,
}

impl GroupHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the group of `code`.
    pub fn attach(&self, code: &str, connection: ClientConnection) {
        self.groups
            .entry(code.to_owned())
            .or_default()
            .insert(connection.id, connection);
    }

    /// Remove a connection from the group of `code`, dropping empty groups.
    pub fn detach(&self, code: &str, connection: ConnectionId) {
        let now_empty = match self.groups.get(code) {
            Some(group) => {
                group.remove(&connection);
                group.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.groups.remove_if(code, |_, group| group.is_empty());
        }
    }

    /// Forget every connection of `code`.
    pub fn drop_group(&self, code: &str) {
        self.groups.remove(code);
    }

    /// Snapshot of the connections of `code`.
    pub fn members(&self, code: &str) -> Vec<ClientConnection> {
        self.groups
            .get(code)
            .map(|group| group.iter().map(|entry| entry.value().clone()).collect())
            .unwrap_or_default()
    }

    /// Number of connections attached to `code`.
    pub fn size(&self, code: &str) -> usize {
        self.groups.get(code).map(|group| group.len()).unwrap_or(0)
    }

    /// Send the same payload to every member of `code`. Returns how many
    /// connections accepted it.
    pub fn broadcast<T>(&self, code: &str, value: &T) -> usize
    where
        T: Serialize + std::fmt::Debug,
    {
        match serde_json::to_string(value) {
            Ok(text) => self.broadcast_text(code, &text),
            Err(err) => {
                warn!(code, error = %err, "failed to serialize broadcast `{value:?}`");
                0
            }
        }
    }

    /// Send an already encoded text frame to every member of `code`.
    pub fn broadcast_text(&self, code: &str, text: &str) -> usize {
        let members = self.members(code);
        let mut reached = 0;
        for member in members {
            if member.tx.send(Message::Text(text.to_owned().into())).is_ok() {
                reached += 1;
            } else {
                self.detach(code, member.id);
            }
        }
        reached
    }

    /// Send each member its own payload, computed by `project`. Members for
    /// which `project` returns `None` are skipped.
    pub fn send_each<T, F>(&self, code: &str, mut project: F) -> usize
    where
        T: Serialize + std::fmt::Debug,
        F: FnMut(&ClientConnection) -> Option<T>,
    {
        let mut reached = 0;
        for member in self.members(code) {
            let Some(value) = project(&member) else {
                continue;
            };
            if send_message_to_websocket(&member.tx, &value, "group projection") {
                reached += 1;
            } else {
                self.detach(code, member.id);
            }
        }
        reached
    }
}
