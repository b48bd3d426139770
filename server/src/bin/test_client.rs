//! Scripted client for poking at a running chaser server.
//!
//! Creates a room (or joins one with `--join`), optionally starts it, then
//! walks north while printing every state update until someone is caught.
//! The chaser spawns on the host, so a second client joining from a few
//! meters away makes for a more interesting run.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{ClientMessage, LatLng, ServerMessage, SettingsPatch, EARTH_RADIUS_METERS};
use std::time::Duration;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3001")]
    server: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "Tester")]
    name: String,

    /// Join an existing room instead of creating one
    #[arg(short = 'j', long)]
    join: Option<String>,

    /// Create the room on the fly if the joined code is unknown
    #[arg(long)]
    mayhem: bool,

    /// Start the game right after creating the room
    #[arg(long)]
    start: bool,

    #[arg(long, default_value = "59.9139", allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value = "10.7522", allow_hyphen_values = true)]
    lng: f64,

    /// Chaser speed when creating a room
    #[arg(long, default_value = "20")]
    speed_kmh: f64,

    /// Meters walked north per second
    #[arg(long, default_value = "1")]
    walk_speed: f64,

    /// Give up after this many seconds
    #[arg(long, default_value = "120")]
    seconds: u64,
}

fn send_json(message: &ClientMessage) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(message)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    info!("Connected to {}", args.server);
    let (mut write, mut read) = ws_stream.split();

    let hello = match &args.join {
        Some(code) => ClientMessage::JoinRoom {
            code: code.clone(),
            name: Some(args.name.clone()),
            emoji: None,
            lat: Some(args.lat),
            lng: Some(args.lng),
            mayhem: args.mayhem,
        },
        None => ClientMessage::CreateRoom {
            code: None,
            name: Some(args.name.clone()),
            emoji: None,
            lat: Some(args.lat),
            lng: Some(args.lng),
            settings: SettingsPatch {
                speed_kmh: Some(args.speed_kmh),
                ..SettingsPatch::default()
            },
            room_name: None,
        },
    };
    write.send(send_json(&hello)?).await?;

    let mut code: Option<String> = None;
    let mut position = LatLng::new(args.lat, args.lng);
    let mut walk = interval(Duration::from_secs(1));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.seconds);

    loop {
        if tokio::time::Instant::now() >= deadline {
            warn!("Giving up after {}s", args.seconds);
            break;
        }

        tokio::select! {
            _ = walk.tick() => {
                if let Some(code) = &code {
                    // One degree of latitude is R * pi / 180 meters
                    position.lat += args.walk_speed / (EARTH_RADIUS_METERS.to_radians());
                    let loc = ClientMessage::Loc {
                        code: code.clone(),
                        lat: position.lat,
                        lng: position.lng,
                    };
                    write.send(send_json(&loc)?).await?;
                }
            }
            frame = timeout(Duration::from_secs(5), read.next()) => {
                let text = match frame {
                    Ok(Some(Ok(Message::Text(text)))) => text,
                    Ok(Some(Ok(_))) => continue,
                    Ok(Some(Err(e))) => return Err(e.into()),
                    Ok(None) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(_) => continue,
                };

                match serde_json::from_str::<ServerMessage>(&text)? {
                    ServerMessage::RoomCreated { code: room, player_id } => {
                        info!("Created room {} as {}", room, player_id);
                        if args.start {
                            let start = ClientMessage::Start { code: room.clone(), admin_key: None };
                            write.send(send_json(&start)?).await?;
                        }
                        code = Some(room);
                    }
                    ServerMessage::RoomJoined { code: room, player_id } => {
                        info!("Joined room {} as {}", room, player_id);
                        code = Some(room);
                    }
                    ServerMessage::Error { message } => {
                        warn!("Server error: {}", message);
                        break;
                    }
                    ServerMessage::Rooms { rooms } => info!("{} rooms", rooms.len()),
                    ServerMessage::State(state) => {
                        info!(
                            "running={} chaser=({:.6}, {:.6}) traveled={:.1}m target={:?}",
                            state.running,
                            state.chaser.lat,
                            state.chaser.lng,
                            state.distance_traveled,
                            state.target_id
                        );
                        if let Some(caught) = state.caught_id {
                            info!("Caught {}", caught);
                            break;
                        }
                    }
                }
            }
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}
