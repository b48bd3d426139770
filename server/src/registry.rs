//! The set of live rooms, keyed by room code
//!
//! The registry is owned by the game loop and handed by `&mut` to the
//! dispatcher and the tick sweep, so every mutation runs to completion before
//! the next event is looked at.

use crate::config::ServerConfig;
use crate::error::RoomError;
use crate::room::{Player, Room, TickOutcome};
use crate::utils::non_empty;
use log::{debug, info};
use rand::Rng;
use shared::{RoomSummary, Settings, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};
use std::collections::HashMap;
use std::time::Instant;

/// Draws a code uniformly from the unambiguous room code alphabet
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Result of one tick sweep across all rooms
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Codes of rooms removed for being idle
    pub pruned: Vec<String>,
    /// `(room code, caught player id)` for every catch this tick
    pub caught: Vec<(String, String)>,
    pub ticked: usize,
}

pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Registers a new lobby with `host` as its only member.
    ///
    /// A missing or empty `code` is generated. Collisions fail with
    /// [`RoomError::RoomExists`] instead of drawing another code.
    pub fn create(
        &mut self,
        code: Option<String>,
        host: Player,
        settings: Settings,
        name: Option<String>,
        now: Instant,
    ) -> Result<&mut Room, RoomError> {
        let code = non_empty(code).unwrap_or_else(generate_room_code);
        if self.rooms.contains_key(&code) {
            return Err(RoomError::RoomExists);
        }

        let name = non_empty(name).unwrap_or_else(|| format!("{}'s Room", host.name));
        info!("Room {} ({}) created by {}", code, name, host.id);

        let room = Room::new(code.clone(), name, host, settings, now);
        Ok(self.rooms.entry(code).or_insert(room))
    }

    pub fn lookup(&self, code: &str) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn lookup_mut(&mut self, code: &str) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Deletes a room. Removing an unknown code is a no-op.
    pub fn remove(&mut self, code: &str) -> Option<Room> {
        let room = self.rooms.remove(code);
        if room.is_some() {
            info!("Room {} removed", code);
        }
        room
    }

    /// Code of the room `player_id` is currently a member of
    pub fn room_of(&self, player_id: &str) -> Option<String> {
        self.rooms
            .values()
            .find(|room| room.has_player(player_id))
            .map(|room| room.code.clone())
    }

    /// Listing of every live room, ordered by code
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let mut summaries: Vec<RoomSummary> = self.rooms.values().map(Room::summary).collect();
        summaries.sort_by(|a, b| a.code.cmp(&b.code));
        summaries
    }

    /// Runs one global tick: prunes idle rooms, then advances and broadcasts
    /// every remaining room.
    pub fn tick_all(&mut self, now: Instant, config: &ServerConfig) -> SweepReport {
        let mut report = SweepReport::default();

        let idle: Vec<String> = self
            .rooms
            .values()
            .filter(|room| room.is_idle(now, config.idle_timeout))
            .map(|room| room.code.clone())
            .collect();
        for code in idle {
            info!("Pruning idle room {}", code);
            self.rooms.remove(&code);
            report.pruned.push(code);
        }

        for room in self.rooms.values_mut() {
            match room.tick(now, config) {
                TickOutcome::Caught { target_id, .. } => {
                    info!(
                        "Room {}: {} caught after {:.1}m",
                        room.code, target_id, room.distance_traveled
                    );
                    report.caught.push((room.code.clone(), target_id));
                }
                TickOutcome::Moved { target_id, meters } => {
                    debug!("Room {}: chaser moved {:.2}m toward {}", room.code, meters, target_id);
                }
                TickOutcome::Idle | TickOutcome::NoTarget => {}
            }
            room.broadcast_state();
            report.ticked += 1;
        }

        report
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
