//! JSON wire protocol exchanged over the WebSocket text frames.
//!
//! Every frame is one object carrying a `type` discriminator. Field names are
//! camelCase on the wire.

use crate::geo::LatLng;
use serde::{Deserialize, Serialize};

/// Per-room game settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Skin shown for the chaser on the client
    pub character: String,
    pub speed_kmh: f64,
    /// Used by clients for initial placement only
    pub spawn_radius: f64,
    pub random_spawn: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            character: "snail".to_string(),
            speed_kmh: 2.0,
            spawn_radius: 5000.0,
            random_spawn: false,
        }
    }
}

impl Settings {
    /// Preset for rooms auto-created by a mayhem join
    pub fn mayhem() -> Self {
        Self {
            character: "snail".to_string(),
            speed_kmh: 0.048,
            spawn_radius: 5000.0,
            random_spawn: false,
        }
    }

    /// Returns a copy with every usable field of `patch` applied.
    ///
    /// Empty strings and non-positive numbers keep the current value.
    /// `random_spawn` is always overwritten, a missing flag meaning `false`.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            character: patch
                .character
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| self.character.clone()),
            speed_kmh: positive(patch.speed_kmh).unwrap_or(self.speed_kmh),
            spawn_radius: positive(patch.spawn_radius).unwrap_or(self.spawn_radius),
            random_spawn: patch.random_spawn.unwrap_or(false),
        }
    }

    /// Chaser speed in meters per second
    pub fn speed_mps(&self) -> f64 {
        self.speed_kmh / 3.6
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Partial settings as sent by clients; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub character: Option<String>,
    pub speed_kmh: Option<f64>,
    pub spawn_radius: Option<f64>,
    pub random_spawn: Option<bool>,
}

/// Messages sent from clients to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        emoji: Option<String>,
        #[serde(default)]
        lat: Option<f64>,
        #[serde(default)]
        lng: Option<f64>,
        #[serde(default)]
        settings: SettingsPatch,
        #[serde(default)]
        room_name: Option<String>,
    },
    JoinRoom {
        code: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        emoji: Option<String>,
        #[serde(default)]
        lat: Option<f64>,
        #[serde(default)]
        lng: Option<f64>,
        #[serde(default)]
        mayhem: bool,
    },
    ListRooms {},
    Loc {
        code: String,
        lat: f64,
        lng: f64,
    },
    Settings {
        code: String,
        #[serde(default)]
        settings: SettingsPatch,
        #[serde(default)]
        admin_key: Option<String>,
    },
    Start {
        code: String,
        #[serde(default)]
        admin_key: Option<String>,
    },
}

impl ClientMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Messages sent from the server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated { code: String, player_id: String },
    RoomJoined { code: String, player_id: String },
    Error { message: String },
    Rooms { rooms: Vec<RoomSummary> },
    State(RoomSnapshot),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One entry of the `rooms` listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub code: String,
    pub name: String,
    pub players: usize,
    pub running: bool,
    pub locked: bool,
}

/// Full room state pushed to every member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub name: String,
    pub running: bool,
    pub locked: bool,
    /// Unix epoch milliseconds of the last start
    pub started_at: Option<u64>,
    pub distance_traveled: f64,
    pub chaser: LatLng,
    pub target_id: Option<String>,
    pub caught_id: Option<String>,
    pub settings: Settings,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_host: bool,
}
