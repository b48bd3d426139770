//! Server network layer handling WebSocket connections and the game loop
//!
//! Connection tasks never touch room state. They forward [`NetworkEvent`]s to
//! the main loop in [`Server::run`], which owns the registry and applies
//! events and ticks one at a time.

use crate::client_manager::{client_id, ClientManager, ClientSender};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::BoxError;
use crate::registry::RoomRegistry;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Body returned to any request that is not a WebSocket upgrade
const HEALTH_BODY: &str = "ok";

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected {
        client_id: String,
        addr: SocketAddr,
        sender: ClientSender,
    },
    MessageReceived {
        client_id: String,
        text: String,
    },
    Disconnected {
        client_id: String,
    },
}

/// Main server coordinating connections and room simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    registry: RoomRegistry,
    dispatcher: Dispatcher,
    tick: u64,

    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(),
            registry: RoomRegistry::new(),
            dispatcher: Dispatcher::new(config),
            tick: 0,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the HTTP server that upgrades WebSocket requests and answers
    /// everything else with the liveness body
    fn spawn_http(&mut self) -> Result<(), BoxError> {
        let listener = self.listener.take().ok_or("Server is already running")?;
        let app = router(self.event_tx.clone());

        tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                error!("HTTP server stopped: {}", e);
            }
        });
        Ok(())
    }

    /// Applies a single network event to the registry
    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Connected {
                client_id,
                addr,
                sender,
            } => {
                self.clients.add_client(client_id, addr, sender);
            }
            NetworkEvent::MessageReceived { client_id, text } => {
                match self.clients.record_message(&client_id) {
                    Some(handle) => self.dispatcher.handle_message(
                        &mut self.registry,
                        &handle,
                        &text,
                        Instant::now(),
                    ),
                    None => warn!("Message from unknown client {}", client_id),
                }
            }
            NetworkEvent::Disconnected { client_id } => {
                self.dispatcher
                    .handle_disconnect(&mut self.registry, &client_id);
                self.clients.remove_client(&client_id);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_http()?;

        let mut tick_interval = interval(self.dispatcher.config().tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let report = self.registry.tick_all(Instant::now(), self.dispatcher.config());
                    self.tick += 1;

                    // Periodic monitoring
                    if self.tick % 60 == 0 && !self.clients.is_empty() {
                        debug!(
                            "Tick {}: {} clients, {} rooms, {} pruned",
                            self.tick,
                            self.clients.len(),
                            self.registry.len(),
                            report.pruned.len()
                        );
                    }
                },
            }
        }

        Ok(())
    }
}

/// State shared by every HTTP request
#[derive(Clone)]
struct ConnectionContext {
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    next_client_id: Arc<AtomicU32>,
}

/// One fallback route: upgrade requests become game connections, anything
/// else is a liveness probe
fn router(event_tx: mpsc::UnboundedSender<NetworkEvent>) -> Router {
    let context = ConnectionContext {
        event_tx,
        next_client_id: Arc::new(AtomicU32::new(1)),
    };
    Router::new().fallback(handle_request).with_state(context)
}

async fn handle_request(
    State(context): State<ConnectionContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match upgrade {
        Ok(ws) => {
            let id = client_id(context.next_client_id.fetch_add(1, Ordering::Relaxed));
            ws.on_upgrade(move |socket| handle_socket(socket, addr, id, context.event_tx))
                .into_response()
        }
        Err(_) => {
            debug!("Liveness request from {}", addr);
            HEALTH_BODY.into_response()
        }
    }
}

/// Runs one upgraded client connection until it closes
async fn handle_socket(
    socket: WebSocket,
    addr: SocketAddr,
    client_id: String,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
) {
    let (mut write, mut read) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    if event_tx
        .send(NetworkEvent::Connected {
            client_id: client_id.clone(),
            addr,
            sender: tx,
        })
        .is_err()
    {
        error!("Game loop is gone, dropping connection {}", client_id);
        writer.abort();
        return;
    }

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let event = NetworkEvent::MessageReceived {
                    client_id: client_id.clone(),
                    text: text.as_str().to_owned(),
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(other) => debug!("Ignoring non-text frame from {}: {:?}", client_id, other),
            Err(e) => {
                warn!("Read error from {}: {}", client_id, e);
                break;
            }
        }
    }

    let _ = event_tx.send(NetworkEvent::Disconnected {
        client_id: client_id.clone(),
    });
    writer.abort();
}
