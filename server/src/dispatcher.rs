//! Interprets client messages against the room registry
//!
//! Validation failures (`Room not found`, `Room full`, ...) are answered with
//! an `error` message. Unauthorized or out-of-phase `settings`/`start`
//! requests and `loc` updates from non-members are dropped without a reply.
//! Frames that do not parse are dropped as well.

use crate::client_manager::ClientHandle;
use crate::config::ServerConfig;
use crate::error::RoomError;
use crate::registry::{generate_room_code, RoomRegistry};
use crate::room::{Player, RoomPhase};
use crate::utils::{get_timestamp, non_empty};
use log::{debug, info};
use shared::{
    ClientMessage, ServerMessage, Settings, SettingsPatch, DEFAULT_EMOJI, DEFAULT_HOST_NAME,
    DEFAULT_PLAYER_NAME, MAYHEM_ROOM_NAME,
};
use std::time::Instant;

/// Identity fields shared by `create_room` and `join_room`
struct PlayerInfo {
    name: String,
    emoji: String,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl PlayerInfo {
    fn new(
        name: Option<String>,
        default_name: &str,
        emoji: Option<String>,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Self {
        Self {
            name: non_empty(name).unwrap_or_else(|| default_name.to_string()),
            emoji: non_empty(emoji).unwrap_or_else(|| DEFAULT_EMOJI.to_string()),
            lat,
            lng,
        }
    }

    fn into_player(self, client: &ClientHandle) -> Player {
        Player::new(client.clone(), self.name, self.emoji, self.lat, self.lng)
    }
}

pub struct Dispatcher {
    config: ServerConfig,
}

impl Dispatcher {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Parses a raw text frame and applies it. Malformed frames are dropped.
    pub fn handle_message(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        raw: &str,
        now: Instant,
    ) {
        match ClientMessage::parse(raw) {
            Ok(message) => self.handle(registry, client, message, now),
            Err(e) => debug!("Dropping malformed message from {}: {}", client.id, e),
        }
    }

    pub fn handle(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        message: ClientMessage,
        now: Instant,
    ) {
        match message {
            ClientMessage::CreateRoom {
                code,
                name,
                emoji,
                lat,
                lng,
                settings,
                room_name,
            } => {
                let info = PlayerInfo::new(name, DEFAULT_HOST_NAME, emoji, lat, lng);
                if let Err(e) =
                    self.create_room(registry, client, code, info, &settings, room_name, now)
                {
                    client.send(&e.into());
                }
            }
            ClientMessage::JoinRoom {
                code,
                name,
                emoji,
                lat,
                lng,
                mayhem,
            } => {
                let info = PlayerInfo::new(name, DEFAULT_PLAYER_NAME, emoji, lat, lng);
                if let Err(e) = self.join_room(registry, client, code, info, mayhem, now) {
                    client.send(&e.into());
                }
            }
            ClientMessage::ListRooms {} => {
                client.send(&ServerMessage::Rooms {
                    rooms: registry.summaries(),
                });
            }
            ClientMessage::Loc { code, lat, lng } => {
                self.update_location(registry, client, &code, lat, lng);
            }
            ClientMessage::Settings {
                code,
                settings,
                admin_key,
            } => {
                self.update_settings(registry, client, &code, &settings, admin_key.as_deref());
            }
            ClientMessage::Start { code, admin_key } => {
                self.start(registry, client, &code, admin_key.as_deref(), now);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_room(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        code: Option<String>,
        info: PlayerInfo,
        settings: &SettingsPatch,
        room_name: Option<String>,
        now: Instant,
    ) -> Result<(), RoomError> {
        let code = non_empty(code).unwrap_or_else(generate_room_code);
        if registry.contains(&code) {
            return Err(RoomError::RoomExists);
        }

        self.leave_current_room(registry, &client.id);
        let settings = Settings::default().merged(settings);
        let room = registry.create(Some(code), info.into_player(client), settings, room_name, now)?;

        client.send(&ServerMessage::RoomCreated {
            code: room.code.clone(),
            player_id: client.id.clone(),
        });
        room.broadcast_state();
        Ok(())
    }

    fn join_room(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        code: String,
        info: PlayerInfo,
        mayhem: bool,
        now: Instant,
    ) -> Result<(), RoomError> {
        if !registry.contains(&code) {
            if !mayhem {
                return Err(RoomError::RoomNotFound);
            }

            self.leave_current_room(registry, &client.id);
            let room = registry.create(
                Some(code),
                info.into_player(client),
                Settings::mayhem(),
                Some(MAYHEM_ROOM_NAME.to_string()),
                now,
            )?;
            info!("Mayhem room {} opened by {}", room.code, client.id);

            client.send(&ServerMessage::RoomJoined {
                code: room.code.clone(),
                player_id: client.id.clone(),
            });
            room.broadcast_state();
            return Ok(());
        }

        let already_member = {
            let room = registry.lookup(&code).ok_or(RoomError::RoomNotFound)?;
            let already_member = room.has_player(&client.id);
            let others = room.len() - usize::from(already_member);
            if others >= self.config.max_players {
                return Err(RoomError::RoomFull);
            }
            if room.name_taken(&info.name, Some(&client.id)) {
                return Err(RoomError::NameTaken);
            }
            already_member
        };

        if !already_member {
            self.leave_current_room(registry, &client.id);
        }

        let room = registry.lookup_mut(&code).ok_or(RoomError::RoomNotFound)?;
        match room.player_mut(&client.id) {
            Some(existing) => {
                existing.name = info.name;
                existing.emoji = info.emoji;
                existing.lat = info.lat;
                existing.lng = info.lng;
            }
            None => room.add_player(info.into_player(client)),
        }
        info!("{} joined room {} ({} players)", client.id, room.code, room.len());

        client.send(&ServerMessage::RoomJoined {
            code: room.code.clone(),
            player_id: client.id.clone(),
        });
        room.broadcast_state();
        Ok(())
    }

    fn update_location(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        code: &str,
        lat: f64,
        lng: f64,
    ) {
        match registry
            .lookup_mut(code)
            .and_then(|room| room.player_mut(&client.id))
        {
            Some(player) => player.set_position(lat, lng),
            None => debug!("Ignoring loc from {} for room {}", client.id, code),
        }
    }

    fn update_settings(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        code: &str,
        patch: &SettingsPatch,
        admin_key: Option<&str>,
    ) {
        let Some(room) = registry.lookup_mut(code) else {
            return;
        };
        let authorized = room.is_host(&client.id) || self.config.is_admin_key(admin_key);
        if !authorized || room.phase() != RoomPhase::Lobby {
            debug!(
                "Ignoring settings from {} for room {} ({:?}, authorized: {})",
                client.id,
                code,
                room.phase(),
                authorized
            );
            return;
        }

        room.update_settings(patch);
        room.broadcast_state();
    }

    fn start(
        &self,
        registry: &mut RoomRegistry,
        client: &ClientHandle,
        code: &str,
        admin_key: Option<&str>,
        now: Instant,
    ) {
        let Some(room) = registry.lookup_mut(code) else {
            return;
        };
        let authorized = room.is_host(&client.id) || self.config.is_admin_key(admin_key);
        if !authorized || room.phase() != RoomPhase::Lobby {
            debug!(
                "Ignoring start from {} for room {} ({:?}, authorized: {})",
                client.id,
                code,
                room.phase(),
                authorized
            );
            return;
        }

        room.start(now, get_timestamp());
        info!("Room {} started by {} with {} players", room.code, client.id, room.len());
        room.broadcast_state();
    }

    /// Removes a disconnected client from its room, deleting the room when
    /// nobody is left.
    pub fn handle_disconnect(&self, registry: &mut RoomRegistry, client_id: &str) {
        self.leave_current_room(registry, client_id);
    }

    fn leave_current_room(&self, registry: &mut RoomRegistry, client_id: &str) {
        let Some(code) = registry.room_of(client_id) else {
            return;
        };
        let Some(room) = registry.lookup_mut(&code) else {
            return;
        };

        room.remove_player(client_id);
        if room.is_empty() {
            registry.remove(&code);
        } else {
            debug!("{} left room {}", client_id, code);
            room.broadcast_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RoomSnapshot;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct TestClient {
        handle: ClientHandle,
        rx: UnboundedReceiver<String>,
    }

    impl TestClient {
        fn new(id: &str) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                handle: ClientHandle::new(id, tx),
                rx,
            }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                messages.push(serde_json::from_str(&text).unwrap());
            }
            messages
        }

        fn last_state(&mut self) -> Option<RoomSnapshot> {
            self.drain().into_iter().rev().find_map(|m| match m {
                ServerMessage::State(snapshot) => Some(snapshot),
                _ => None,
            })
        }
    }

    fn send(
        dispatcher: &Dispatcher,
        registry: &mut RoomRegistry,
        client: &TestClient,
        raw: &str,
        now: Instant,
    ) {
        dispatcher.handle_message(registry, &client.handle, raw, now);
    }

    fn setup() -> (Dispatcher, RoomRegistry, Instant) {
        (
            Dispatcher::new(ServerConfig::default()),
            RoomRegistry::new(),
            Instant::now(),
        )
    }

    fn create(d: &Dispatcher, r: &mut RoomRegistry, c: &TestClient, now: Instant) {
        send(
            d,
            r,
            c,
            r#"{"type":"create_room","code":"ABC123","name":"Host","lat":0,"lng":0}"#,
            now,
        );
    }

    #[test]
    fn test_create_room_replies_and_broadcasts() {
        let (d, mut r, now) = setup();
        let mut host = TestClient::new("p1");
        create(&d, &mut r, &host, now);

        let messages = host.drain();
        assert_eq!(
            messages[0],
            ServerMessage::RoomCreated {
                code: "ABC123".to_string(),
                player_id: "p1".to_string(),
            }
        );
        match &messages[1] {
            ServerMessage::State(snapshot) => {
                assert_eq!(snapshot.players.len(), 1);
                assert_eq!(snapshot.name, "Host's Room");
                assert_eq!(snapshot.settings, Settings::default());
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_create_room_defaults_and_settings() {
        let (d, mut r, now) = setup();
        let mut host = TestClient::new("p1");
        send(
            &d,
            &mut r,
            &host,
            r#"{"type":"create_room","settings":{"speedKmh":7,"character":"ghost"}}"#,
            now,
        );

        let snapshot = host.last_state().unwrap();
        assert_eq!(snapshot.code.len(), 6);
        assert_eq!(snapshot.name, "You's Room");
        assert_eq!(snapshot.players[0].emoji, DEFAULT_EMOJI);
        assert_eq!(snapshot.settings.speed_kmh, 7.0);
        assert_eq!(snapshot.settings.character, "ghost");
        assert_eq!(snapshot.settings.spawn_radius, 5000.0);
    }

    #[test]
    fn test_create_existing_room_errors() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let mut other = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        create(&d, &mut r, &other, now);

        assert_eq!(other.drain(), vec![ServerMessage::error("Room already exists")]);
        assert_eq!(r.lookup("ABC123").unwrap().len(), 1);
    }

    #[test]
    fn test_join_unknown_room() {
        let (d, mut r, now) = setup();
        let mut client = TestClient::new("p1");
        send(&d, &mut r, &client, r#"{"type":"join_room","code":"NOPE22","name":"A"}"#, now);

        assert_eq!(client.drain(), vec![ServerMessage::error("Room not found")]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_join_mayhem_creates_preset_room() {
        let (d, mut r, now) = setup();
        let mut client = TestClient::new("p1");
        send(
            &d,
            &mut r,
            &client,
            r#"{"type":"join_room","code":"WILD42","name":"A","mayhem":true}"#,
            now,
        );

        let messages = client.drain();
        assert_eq!(
            messages[0],
            ServerMessage::RoomJoined {
                code: "WILD42".to_string(),
                player_id: "p1".to_string(),
            }
        );
        let room = r.lookup("WILD42").unwrap();
        assert_eq!(room.name, MAYHEM_ROOM_NAME);
        assert_eq!(room.settings, Settings::mayhem());
        assert_eq!(room.host_id, "p1");
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_join_broadcasts_to_all_members() {
        let (d, mut r, now) = setup();
        let mut host = TestClient::new("p1");
        let mut runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        host.drain();

        send(
            &d,
            &mut r,
            &runner,
            r#"{"type":"join_room","code":"ABC123","name":"Runner","lat":0.01,"lng":0}"#,
            now,
        );

        let runner_messages = runner.drain();
        assert_eq!(
            runner_messages[0],
            ServerMessage::RoomJoined {
                code: "ABC123".to_string(),
                player_id: "p2".to_string(),
            }
        );
        let snapshot = host.last_state().unwrap();
        assert_eq!(snapshot.players.len(), 2);
        assert_eq!(snapshot.players[1].name, "Runner");
        assert!(!snapshot.players[1].is_host);
    }

    #[test]
    fn test_join_rejects_duplicate_name_case_insensitive() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let mut other = TestClient::new("p2");
        create(&d, &mut r, &host, now);

        send(&d, &mut r, &other, r#"{"type":"join_room","code":"ABC123","name":"hOsT"}"#, now);
        assert_eq!(other.drain(), vec![ServerMessage::error("Name already used")]);
        assert_eq!(r.lookup("ABC123").unwrap().len(), 1);
    }

    #[test]
    fn test_join_full_room() {
        let (mut d, mut r, now) = setup();
        d.config.max_players = 2;
        let host = TestClient::new("p1");
        let second = TestClient::new("p2");
        let mut third = TestClient::new("p3");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &second, r#"{"type":"join_room","code":"ABC123","name":"B"}"#, now);
        send(&d, &mut r, &third, r#"{"type":"join_room","code":"ABC123","name":"C"}"#, now);

        assert_eq!(third.drain(), vec![ServerMessage::error("Room full")]);
        assert_eq!(r.lookup("ABC123").unwrap().len(), 2);
    }

    #[test]
    fn test_join_moves_player_out_of_previous_room() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let wanderer = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(
            &d,
            &mut r,
            &wanderer,
            r#"{"type":"create_room","code":"OTHER2","name":"W"}"#,
            now,
        );
        assert!(r.contains("OTHER2"));

        send(&d, &mut r, &wanderer, r#"{"type":"join_room","code":"ABC123","name":"W"}"#, now);
        assert!(!r.contains("OTHER2"));
        assert_eq!(r.room_of("p2").as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_rejoin_same_room_updates_in_place() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"Runner"}"#, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"Sprinter"}"#, now);

        let room = r.lookup("ABC123").unwrap();
        assert_eq!(room.len(), 2);
        assert_eq!(room.players[1].name, "Sprinter");
    }

    #[test]
    fn test_list_rooms() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let mut browser = TestClient::new("p2");
        create(&d, &mut r, &host, now);

        send(&d, &mut r, &browser, r#"{"type":"list_rooms"}"#, now);
        match browser.drain().pop().unwrap() {
            ServerMessage::Rooms { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].code, "ABC123");
                assert_eq!(rooms[0].players, 1);
                assert!(!rooms[0].running);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_loc_requires_membership_and_does_not_broadcast() {
        let (d, mut r, now) = setup();
        let mut host = TestClient::new("p1");
        let stranger = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        host.drain();

        send(&d, &mut r, &host, r#"{"type":"loc","code":"ABC123","lat":1.5,"lng":2.5}"#, now);
        send(&d, &mut r, &stranger, r#"{"type":"loc","code":"ABC123","lat":9,"lng":9}"#, now);

        let room = r.lookup("ABC123").unwrap();
        assert_eq!(room.players[0].lat, Some(1.5));
        assert_eq!(room.players[0].lng, Some(2.5));
        assert_eq!(room.len(), 1);
        assert!(host.drain().is_empty());
    }

    #[test]
    fn test_settings_requires_host_or_admin() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"R"}"#, now);

        send(
            &d,
            &mut r,
            &runner,
            r#"{"type":"settings","code":"ABC123","settings":{"speedKmh":50}}"#,
            now,
        );
        assert_eq!(r.lookup("ABC123").unwrap().settings.speed_kmh, 2.0);

        send(
            &d,
            &mut r,
            &runner,
            r#"{"type":"settings","code":"ABC123","settings":{"speedKmh":50},"adminKey":"0000"}"#,
            now,
        );
        assert_eq!(r.lookup("ABC123").unwrap().settings.speed_kmh, 50.0);

        send(
            &d,
            &mut r,
            &host,
            r#"{"type":"settings","code":"ABC123","settings":{"randomSpawn":true,"speedKmh":0}}"#,
            now,
        );
        let settings = &r.lookup("ABC123").unwrap().settings;
        assert!(settings.random_spawn);
        assert_eq!(settings.speed_kmh, 50.0);
    }

    #[test]
    fn test_start_by_non_host_is_ignored() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let mut runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"R"}"#, now);
        runner.drain();

        send(&d, &mut r, &runner, r#"{"type":"start","code":"ABC123","adminKey":"nope"}"#, now);
        assert!(!r.lookup("ABC123").unwrap().running);
        assert!(runner.drain().is_empty());
    }

    #[test]
    fn test_start_locks_room_against_settings() {
        let (d, mut r, now) = setup();
        let mut host = TestClient::new("p1");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &host, r#"{"type":"loc","code":"ABC123","lat":0.5,"lng":0.5}"#, now);
        send(&d, &mut r, &host, r#"{"type":"start","code":"ABC123"}"#, now);

        let snapshot = host.last_state().unwrap();
        assert!(snapshot.running && snapshot.locked);
        assert!(snapshot.started_at.is_some());
        assert_eq!(r.lookup("ABC123").unwrap().phase(), RoomPhase::Running);
        assert_eq!(snapshot.chaser, shared::LatLng::new(0.5, 0.5));

        send(
            &d,
            &mut r,
            &host,
            r#"{"type":"settings","code":"ABC123","settings":{"speedKmh":99}}"#,
            now,
        );
        assert_eq!(r.lookup("ABC123").unwrap().settings.speed_kmh, 2.0);
        assert!(host.drain().is_empty());
    }

    #[test]
    fn test_start_after_catch_is_ignored() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &host, r#"{"type":"start","code":"ABC123"}"#, now);
        r.tick_all(now + Duration::from_secs(1), d.config());
        assert_eq!(r.lookup("ABC123").unwrap().caught_id.as_deref(), Some("p1"));
        assert_eq!(r.lookup("ABC123").unwrap().phase(), RoomPhase::Caught);

        send(&d, &mut r, &host, r#"{"type":"start","code":"ABC123"}"#, now);
        let room = r.lookup("ABC123").unwrap();
        assert_eq!(room.phase(), RoomPhase::Caught);
        assert!(!room.running);
        assert_eq!(room.caught_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_orphaned_room_only_startable_with_admin_key() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"R"}"#, now);
        d.handle_disconnect(&mut r, "p1");

        let room = r.lookup("ABC123").unwrap();
        assert_eq!(room.host_id, "p1");
        assert_eq!(room.len(), 1);

        send(&d, &mut r, &runner, r#"{"type":"start","code":"ABC123"}"#, now);
        assert!(!r.lookup("ABC123").unwrap().running);

        send(&d, &mut r, &runner, r#"{"type":"start","code":"ABC123","adminKey":"0000"}"#, now);
        let room = r.lookup("ABC123").unwrap();
        assert!(room.running);
        assert_eq!(room.chaser, shared::LatLng::new(0.0, 0.0));
    }

    #[test]
    fn test_disconnect_deletes_empty_room() {
        let (d, mut r, now) = setup();
        let host = TestClient::new("p1");
        let mut runner = TestClient::new("p2");
        create(&d, &mut r, &host, now);
        send(&d, &mut r, &runner, r#"{"type":"join_room","code":"ABC123","name":"R"}"#, now);
        runner.drain();

        d.handle_disconnect(&mut r, "p1");
        assert!(r.contains("ABC123"));
        assert_eq!(runner.last_state().unwrap().players.len(), 1);

        d.handle_disconnect(&mut r, "p2");
        assert!(!r.contains("ABC123"));

        d.handle_disconnect(&mut r, "p2");
        assert!(r.is_empty());
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let (d, mut r, now) = setup();
        let mut client = TestClient::new("p1");
        for raw in ["", "{", "[]", r#"{"type":"fly"}"#, r#"{"type":"loc","code":"A"}"#] {
            send(&d, &mut r, &client, raw, now);
        }
        assert!(client.drain().is_empty());
        assert!(r.is_empty());
    }
}
