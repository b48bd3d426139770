//! Validation failures reported back to the requesting client

use shared::ServerMessage;
use thiserror::Error;

/// Rejections surfaced to the sender as an `error` message.
///
/// The display strings are part of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room already exists")]
    RoomExists,
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room full")]
    RoomFull,
    #[error("Name already used")]
    NameTaken,
}

impl From<RoomError> for ServerMessage {
    fn from(err: RoomError) -> Self {
        ServerMessage::error(err.to_string())
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
