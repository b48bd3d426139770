//! Connection tracking for the WebSocket server
//!
//! Every accepted connection gets an opaque id (`p1`, `p2`, ...) and an
//! outbound channel drained by its writer task. The game loop owns the
//! [`ClientManager`] and resolves incoming events to a [`ClientHandle`]
//! before handing them to the dispatcher.
//!
//! Sends are best-effort: a handle whose writer task is gone is skipped and
//! the failure is never reported to anyone else.

use log::{error, info};
use shared::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Outbound text frames for one connection
pub type ClientSender = mpsc::UnboundedSender<String>;

/// Formats the id handed to the `seq`-th accepted connection
pub fn client_id(seq: u32) -> String {
    format!("p{}", seq)
}

/// Cheap, cloneable send side of a connection
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: String,
    sender: ClientSender,
}

impl ClientHandle {
    pub fn new(id: impl Into<String>, sender: ClientSender) -> Self {
        Self {
            id: id.into(),
            sender,
        }
    }

    /// Returns false if the connection's writer has already gone away
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queues an already serialized frame. Closed channels are skipped.
    pub fn send_text(&self, text: &str) -> bool {
        if !self.is_open() {
            return false;
        }
        self.sender.send(text.to_string()).is_ok()
    }

    /// Serializes and queues a single message
    pub fn send(&self, message: &ServerMessage) -> bool {
        match message.to_json() {
            Ok(text) => self.send_text(&text),
            Err(e) => {
                error!("Failed to serialize message for {}: {}", self.id, e);
                false
            }
        }
    }
}

/// A live connection as seen by the game loop
#[derive(Debug)]
pub struct Client {
    pub handle: ClientHandle,
    /// Peer address, for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Last time we received a frame from this client
    pub last_seen: Instant,
    pub messages_received: u64,
}

impl Client {
    pub fn new(handle: ClientHandle, addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            handle,
            addr,
            connected_at: now,
            last_seen: now,
            messages_received: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.messages_received += 1;
    }

    /// Time since the last frame, or since connecting if none arrived yet
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// All connections currently known to the game loop
pub struct ClientManager {
    clients: HashMap<String, Client>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Registers a freshly accepted connection
    pub fn add_client(&mut self, id: String, addr: SocketAddr, sender: ClientSender) -> ClientHandle {
        let handle = ClientHandle::new(id.clone(), sender);
        info!("Client {} connected from {}", id, addr);
        self.clients.insert(id, Client::new(handle.clone(), addr));
        handle
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn remove_client(&mut self, id: &str) -> bool {
        if let Some(client) = self.clients.remove(id) {
            let now = Instant::now();
            info!(
                "Client {} disconnected after {:.1}s ({} messages, idle {:.1}s)",
                id,
                now.saturating_duration_since(client.connected_at).as_secs_f32(),
                client.messages_received,
                client.idle_for(now).as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    /// Records activity and returns the handle for replying to the client
    pub fn record_message(&mut self, id: &str) -> Option<ClientHandle> {
        let client = self.clients.get_mut(id)?;
        client.touch();
        Some(client.handle.clone())
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
