use common::room::RowDecodeError;
use common::store::StoreError;
use common::{PlayerId, RoomId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Failed to create room: {0}")]
    CreateFailed(StoreError),

    #[error("Room {0} not found")]
    NotFound(RoomId),

    #[error("Room {0} is not available")]
    NotAvailable(RoomId),

    #[error("Room {0} is full")]
    Full(RoomId),

    #[error("Player {player_id} is not in room {room_id}")]
    NotParticipant { room_id: RoomId, player_id: PlayerId },

    #[error("Invalid cell index: {0}")]
    InvalidMove(usize),

    #[error("Rematch not possible in room {room_id}: {reason}")]
    InvalidRematch { room_id: RoomId, reason: String },

    #[error("Lost connection to room {room_id} after {attempts} reconnect attempts")]
    ConnectionFailure { room_id: RoomId, attempts: u32 },

    #[error(transparent)]
    Decode(#[from] RowDecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
