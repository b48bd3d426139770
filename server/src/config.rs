//! Runtime settings for the game loop and protocol rules

use shared::{
    ADMIN_KEY, CATCH_RADIUS_METERS, IDLE_TIMEOUT_SECS, MAX_PLAYERS, MAX_TICK_SECONDS, TICK_MS,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between simulation ticks
    pub tick_duration: Duration,
    /// Maximum members per room
    pub max_players: usize,
    pub catch_radius_meters: f64,
    /// How long a started room may sit without members before it is pruned
    pub idle_timeout: Duration,
    /// Clamp for the elapsed time simulated by one tick
    pub max_tick_seconds: f64,
    /// Shared secret granting host authority in any room
    pub admin_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(TICK_MS),
            max_players: MAX_PLAYERS,
            catch_radius_meters: CATCH_RADIUS_METERS,
            idle_timeout: Duration::from_secs(IDLE_TIMEOUT_SECS),
            max_tick_seconds: MAX_TICK_SECONDS,
            admin_key: ADMIN_KEY.to_string(),
        }
    }
}

impl ServerConfig {
    /// Returns true if `key` matches the configured admin secret
    pub fn is_admin_key(&self, key: Option<&str>) -> bool {
        key == Some(self.admin_key.as_str())
    }
}
