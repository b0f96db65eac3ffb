//! Interface of the hosted row store and realtime feed the hub runs on.
//!
//! The only concurrency primitive is `conditional_update`: a write that
//! applies only while the row still matches a predicate and reports how
//! many rows it touched. Zero means somebody else changed the row first.

mod error;
mod memory;

use std::future::Future;

use tokio::sync::mpsc;

use crate::room::{NewRoom, PlayerProfile, RoomPatch, RoomPredicate, RoomQuery, RoomRow};
use crate::{GameType, PlayerId, RoomId};

pub use error::StoreError;
pub use memory::MemoryStore;

/// One change pushed by a room feed: the full row after the change, or the
/// row's removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChange {
    Snapshot(RoomRow),
    Deleted,
}

/// Push channel for one room. The sender side closing means the transport
/// was lost.
pub type RoomFeed = mpsc::UnboundedReceiver<RoomChange>;

pub trait RoomStore: Send + Sync + Clone + 'static {
    fn insert_room(&self, room: NewRoom) -> impl Future<Output = Result<RoomRow, StoreError>> + Send;

    fn select_room(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomRow>, StoreError>> + Send;

    fn select_rooms(
        &self,
        query: &RoomQuery,
    ) -> impl Future<Output = Result<Vec<RoomRow>, StoreError>> + Send;

    /// Applies `patch` only if the row matches `predicate`. Returns the
    /// number of rows changed.
    fn conditional_update(
        &self,
        room_id: &RoomId,
        predicate: &RoomPredicate,
        patch: &RoomPatch,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn update_room(
        &self,
        room_id: &RoomId,
        patch: &RoomPatch,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        async move {
            self.conditional_update(room_id, &RoomPredicate::any(), patch)
                .await
        }
    }

    fn delete_room(
        &self,
        room_id: &RoomId,
        predicate: &RoomPredicate,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Server-side matchmaking procedure. Must run as one atomic step: join
    /// the oldest open room of another player, or hand out a waiting room
    /// owned by the caller.
    fn find_or_create_match(
        &self,
        player_id: &PlayerId,
        game_type: &GameType,
    ) -> impl Future<Output = Result<RoomRow, StoreError>> + Send;

    fn subscribe(&self, room_id: &RoomId) -> impl Future<Output = Result<RoomFeed, StoreError>> + Send;

    fn select_profiles(
        &self,
        player_ids: &[PlayerId],
    ) -> impl Future<Output = Result<Vec<PlayerProfile>, StoreError>> + Send;
}
