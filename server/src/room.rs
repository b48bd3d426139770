//! Room state and the per-room chase simulation
//!
//! A room moves through three phases:
//!
//! - **Lobby**: `running = false`, `locked = false`. Settings may change.
//! - **Running**: `running = true`, `locked = true`. Every tick the chaser
//!   heads for the nearest member with a known position.
//! - **Caught**: `running = false`, `locked = true`. The chaser came within
//!   the catch radius of its target and the game is over.
//!
//! Members are kept in a `Vec` because join order breaks ties when two
//! players are equally close to the chaser.

use crate::client_manager::ClientHandle;
use crate::config::ServerConfig;
use log::error;
use shared::{
    distance, step_toward, LatLng, PlayerSnapshot, RoomSnapshot, RoomSummary, ServerMessage,
    Settings, SettingsPatch,
};
use std::time::{Duration, Instant};

/// A connected player and their last reported position
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub emoji: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub handle: ClientHandle,
}

impl Player {
    pub fn new(
        handle: ClientHandle,
        name: String,
        emoji: String,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Self {
        Self {
            id: handle.id.clone(),
            name,
            emoji,
            lat,
            lng,
            handle,
        }
    }

    /// Known position, if both coordinates have been reported
    pub fn position(&self) -> Option<LatLng> {
        Some(LatLng::new(self.lat?, self.lng?))
    }

    pub fn set_position(&mut self, lat: f64, lng: f64) {
        self.lat = Some(lat);
        self.lng = Some(lng);
    }

    fn snapshot(&self, host_id: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            emoji: self.emoji.clone(),
            lat: self.lat,
            lng: self.lng,
            is_host: self.id == host_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    Running,
    Caught,
}

/// What a single tick did to a room
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The room is not running; only the step clock was refreshed
    Idle,
    /// Nobody has reported a position yet
    NoTarget,
    Moved { target_id: String, meters: f64 },
    Caught { target_id: String, meters: f64 },
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub name: String,
    /// Set at creation and never reassigned
    pub host_id: String,
    pub players: Vec<Player>,
    pub settings: Settings,
    pub chaser: LatLng,
    pub target_id: Option<String>,
    pub caught_id: Option<String>,
    pub running: bool,
    pub locked: bool,
    /// Wall clock of the last start, epoch milliseconds
    pub started_at: Option<u64>,
    pub distance_traveled: f64,
    started: Option<Instant>,
    last_step: Instant,
}

impl Room {
    /// Creates a lobby whose only member is `host`. The chaser starts at the
    /// host's position, or the origin for unknown coordinates.
    pub fn new(code: String, name: String, host: Player, settings: Settings, now: Instant) -> Self {
        Self {
            code,
            name,
            host_id: host.id.clone(),
            chaser: LatLng::or_origin(host.lat, host.lng),
            players: vec![host],
            settings,
            target_id: None,
            caught_id: None,
            running: false,
            locked: false,
            started_at: None,
            distance_traveled: 0.0,
            started: None,
            last_step: now,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        match (self.running, self.locked) {
            (true, _) => RoomPhase::Running,
            (false, true) => RoomPhase::Caught,
            (false, false) => RoomPhase::Lobby,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_id == player_id
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn has_player(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    /// Case-insensitive name check, ignoring the member `except`
    pub fn name_taken(&self, name: &str, except: Option<&str>) -> bool {
        let lower = name.to_lowercase();
        self.players
            .iter()
            .filter(|p| Some(p.id.as_str()) != except)
            .any(|p| p.name.to_lowercase() == lower)
    }

    /// Appends a member, keeping join order
    pub fn add_player(&mut self, player: Player) {
        self.players.push(player);
    }

    /// Removes a member without disturbing the order of the others
    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn update_settings(&mut self, patch: &SettingsPatch) {
        self.settings = self.settings.merged(patch);
    }

    /// Lobby -> Running. Resets the chaser onto the host, or the origin when
    /// the host has left or never reported a position.
    pub fn start(&mut self, now: Instant, now_ms: u64) {
        self.running = true;
        self.locked = true;
        self.started_at = Some(now_ms);
        self.started = Some(now);
        self.caught_id = None;
        self.distance_traveled = 0.0;
        self.last_step = now;

        let (lat, lng) = self
            .player(&self.host_id)
            .map(|host| (host.lat, host.lng))
            .unwrap_or((None, None));
        self.chaser = LatLng::or_origin(lat, lng);
    }

    /// The member closest to the chaser. Ties go to whoever joined first.
    pub fn nearest_target(&self) -> Option<(&Player, f64)> {
        let mut nearest: Option<(&Player, f64)> = None;
        for player in &self.players {
            let Some(position) = player.position() else {
                continue;
            };
            let d = distance(self.chaser, position);
            if nearest.map_or(true, |(_, best)| d < best) {
                nearest = Some((player, d));
            }
        }
        nearest
    }

    /// Advances the simulation to `now`.
    pub fn tick(&mut self, now: Instant, config: &ServerConfig) -> TickOutcome {
        if !self.running {
            self.last_step = now;
            return TickOutcome::Idle;
        }

        let dt = now
            .saturating_duration_since(self.last_step)
            .as_secs_f64()
            .min(config.max_tick_seconds);
        self.last_step = now;

        let Some((target_id, target)) = self
            .nearest_target()
            .and_then(|(player, _)| Some((player.id.clone(), player.position()?)))
        else {
            self.target_id = None;
            return TickOutcome::NoTarget;
        };
        self.target_id = Some(target_id.clone());

        let max_step = self.settings.speed_mps() * dt;
        let next = step_toward(self.chaser, target, max_step);
        let meters = distance(self.chaser, next);
        self.distance_traveled += meters;
        self.chaser = next;

        if distance(self.chaser, target) <= config.catch_radius_meters {
            self.running = false;
            self.locked = true;
            self.caught_id = Some(target_id.clone());
            return TickOutcome::Caught { target_id, meters };
        }

        TickOutcome::Moved { target_id, meters }
    }

    /// True once a started room has had no members for longer than `timeout`
    /// since it started
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        match self.started {
            Some(started) => {
                self.is_empty() && now.saturating_duration_since(started) > timeout
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            name: self.name.clone(),
            running: self.running,
            locked: self.locked,
            started_at: self.started_at,
            distance_traveled: self.distance_traveled,
            chaser: self.chaser,
            target_id: self.target_id.clone(),
            caught_id: self.caught_id.clone(),
            settings: self.settings.clone(),
            players: self
                .players
                .iter()
                .map(|p| p.snapshot(&self.host_id))
                .collect(),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            code: self.code.clone(),
            name: self.name.clone(),
            players: self.players.len(),
            running: self.running,
            locked: self.locked,
        }
    }

    /// Serializes `message` once and pushes it to every member.
    ///
    /// Returns the number of members it was queued for.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize broadcast for room {}: {}", self.code, e);
                return 0;
            }
        };

        self.players
            .iter()
            .filter(|p| p.handle.send_text(&text))
            .count()
    }

    pub fn broadcast_state(&self) -> usize {
        self.broadcast(&ServerMessage::State(self.snapshot()))
    }
}
