mod client;
mod error;
mod subscription;

pub use client::{MoveOutcome, RoomSyncClient, invite_code};
pub use error::SyncError;
pub use subscription::{ConnectionStatus, RoomEvent, RoomSubscription};
