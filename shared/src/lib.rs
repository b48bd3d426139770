//! Types and constants shared by the chaser server and its clients.
//!
//! The wire protocol lives in [`protocol`], the great-circle helpers the
//! simulation relies on live in [`geo`].

pub mod geo;
pub mod protocol;

pub use geo::{distance, step_toward, LatLng, EARTH_RADIUS_METERS};
pub use protocol::{
    ClientMessage, PlayerSnapshot, RoomSnapshot, RoomSummary, ServerMessage, Settings,
    SettingsPatch,
};

pub const TICK_MS: u64 = 1000;
pub const MAX_PLAYERS: usize = 10;
pub const CATCH_RADIUS_METERS: f64 = 3.0;
pub const IDLE_TIMEOUT_SECS: u64 = 30 * 60;
/// Upper bound on the elapsed time a single tick may simulate.
pub const MAX_TICK_SECONDS: f64 = 10.0;
pub const ADMIN_KEY: &str = "0000";
pub const DEFAULT_PORT: u16 = 3001;

pub const ROOM_CODE_LEN: usize = 6;
/// Room code characters, without the easily confused I, L, O, 0 and 1.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub const DEFAULT_EMOJI: &str = "🧌";
pub const DEFAULT_HOST_NAME: &str = "You";
pub const DEFAULT_PLAYER_NAME: &str = "Player";
pub const MAYHEM_ROOM_NAME: &str = "Mayhem";
