//! # Chaser Server Library
//!
//! Authoritative server for a location-based chase game. Players join a room
//! and report their GPS position; a virtual chaser walks toward whoever is
//! nearest once per tick until it gets within the catch radius.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns room membership, the chaser position and the outcome of
//! each game. Clients only report where they are and render the snapshots
//! they receive.
//!
//! ### Room Lifecycle
//! Rooms are created explicitly, or on the fly by a "mayhem" join against an
//! unknown code. A room disappears as soon as its last member leaves. Only
//! the host (or a holder of the admin key) may change settings or start the
//! game, and a started room stays locked.
//!
//! ### State Broadcasting
//! After every tick and every membership or settings change the full room
//! snapshot is pushed to each member. Delivery is best-effort: closed
//! connections are skipped.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! Connection tasks only move frames. Everything they receive is forwarded
//! to one loop that owns the [`registry::RoomRegistry`] and processes
//! events and ticks sequentially, so room state needs no locking.
//!
//! ### WebSocket Transport
//! Each client holds one WebSocket carrying JSON text frames. Plain HTTP
//! requests on the same port get a fixed `200 ok` for liveness probes.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection ids and best-effort outbound handles
//! - `config`: tick rate, capacity, catch radius, idle timeout, admin key
//! - `dispatcher`: protocol rules for every inbound message type
//! - `error`: validation errors reported to clients
//! - `network`: accept loop, per-connection tasks and the game loop
//! - `registry`: the live rooms and the tick sweep
//! - `room`: players, rooms and the chase simulation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::BoxError> {
//!     let mut server = Server::new("0.0.0.0:3001", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod network;
pub mod registry;
pub mod room;
pub mod utils;
