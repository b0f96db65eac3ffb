use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};

use crate::games::tictactoe::wire;
use crate::room::{
    NewRoom, PlayerProfile, RoomPatch, RoomPredicate, RoomQuery, RoomRow, RoomStatus,
    format_timestamp,
};
use crate::{GameType, PlayerId, RoomId, log};
use super::{RoomChange, RoomFeed, RoomStore, StoreError};

/// In-process implementation of the store, used for tests and local play.
/// Every operation takes the single table lock, which is what makes
/// `find_or_create_match` atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    rooms: HashMap<RoomId, StoredRoom>,
    next_room_id: u64,
    profiles: HashMap<PlayerId, PlayerProfile>,
    feeds: HashMap<RoomId, Vec<mpsc::UnboundedSender<RoomChange>>>,
    failing_subscribes: u32,
    offline: bool,
}

struct StoredRoom {
    row: RoomRow,
    sequence: u64,
}

impl Tables {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, room: NewRoom) -> RoomRow {
        self.next_room_id += 1;
        let sequence = self.next_room_id;
        let id = RoomId::new(format!("room_{}", sequence));
        let now = format_timestamp(Utc::now());

        let row = RoomRow {
            id: id.to_string(),
            game_type: room.game_type.to_string(),
            status: room.status.as_str().to_string(),
            player1_id: room.player1_id.to_string(),
            player2_id: room.player2_id.as_ref().map(PlayerId::to_string),
            current_turn: room.current_turn.to_string(),
            board: wire::encode(&room.board),
            winner_id: None,
            is_draw: false,
            is_private: room.is_private,
            rematch_requested_by: None,
            rematch_room_id: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.rooms.insert(
            id,
            StoredRoom {
                row: row.clone(),
                sequence,
            },
        );
        row
    }

    fn update(&mut self, room_id: &RoomId, predicate: &RoomPredicate, patch: &RoomPatch) -> u64 {
        let Some(stored) = self.rooms.get_mut(room_id) else {
            return 0;
        };
        if !predicate.matches(&stored.row) {
            return 0;
        }
        patch.apply_to(&mut stored.row);
        stored.row.updated_at = format_timestamp(Utc::now());
        let snapshot = stored.row.clone();
        self.notify(room_id, RoomChange::Snapshot(snapshot));
        1
    }

    fn notify(&mut self, room_id: &RoomId, change: RoomChange) {
        if let Some(senders) = self.feeds.get_mut(room_id) {
            senders.retain(|sender| sender.send(change.clone()).is_ok());
            if senders.is_empty() {
                self.feeds.remove(room_id);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_profile(&self, profile: PlayerProfile) {
        let mut tables = self.tables.lock().await;
        tables.profiles.insert(profile.id.clone(), profile);
    }

    /// Makes the next `count` subscribe calls fail as if the realtime
    /// endpoint could not be reached.
    pub async fn fail_next_subscribes(&self, count: u32) {
        let mut tables = self.tables.lock().await;
        tables.failing_subscribes = count;
    }

    /// Cuts every open feed of a room, as a dropped connection would.
    pub async fn drop_feeds(&self, room_id: &RoomId) {
        let mut tables = self.tables.lock().await;
        tables.feeds.remove(room_id);
    }

    /// While offline every request fails with `StoreError::Unavailable`.
    pub async fn set_offline(&self, offline: bool) {
        let mut tables = self.tables.lock().await;
        tables.offline = offline;
    }

    pub async fn open_feed_count(&self, room_id: &RoomId) -> usize {
        let mut tables = self.tables.lock().await;
        match tables.feeds.get_mut(room_id) {
            Some(senders) => {
                senders.retain(|sender| !sender.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.tables.lock().await.rooms.len()
    }

    /// Writes a row as-is, skipping every check. Lets tests plant rows the
    /// client must refuse to decode.
    pub async fn put_raw_row(&self, row: RoomRow) {
        let mut tables = self.tables.lock().await;
        tables.next_room_id += 1;
        let sequence = tables.next_room_id;
        let room_id = RoomId::new(row.id.clone());
        tables.rooms.insert(
            room_id.clone(),
            StoredRoom {
                row: row.clone(),
                sequence,
            },
        );
        tables.notify(&room_id, RoomChange::Snapshot(row));
    }
}

impl RoomStore for MemoryStore {
    async fn insert_room(&self, room: NewRoom) -> Result<RoomRow, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_online()?;
        Ok(tables.insert(room))
    }

    async fn select_room(&self, room_id: &RoomId) -> Result<Option<RoomRow>, StoreError> {
        let tables = self.tables.lock().await;
        tables.check_online()?;
        Ok(tables.rooms.get(room_id).map(|stored| stored.row.clone()))
    }

    async fn select_rooms(&self, query: &RoomQuery) -> Result<Vec<RoomRow>, StoreError> {
        let tables = self.tables.lock().await;
        tables.check_online()?;

        let mut matching: Vec<&StoredRoom> = tables
            .rooms
            .values()
            .filter(|stored| query.matches(&stored.row))
            .collect();
        if query.newest_first {
            matching.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        } else {
            matching.sort_by_key(|stored| stored.sequence);
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|stored| stored.row.clone())
            .collect())
    }

    async fn conditional_update(
        &self,
        room_id: &RoomId,
        predicate: &RoomPredicate,
        patch: &RoomPatch,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_online()?;
        if patch.is_empty() {
            return Err(StoreError::Rejected("empty update".to_string()));
        }
        Ok(tables.update(room_id, predicate, patch))
    }

    async fn delete_room(&self, room_id: &RoomId, predicate: &RoomPredicate) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_online()?;

        let matches = tables
            .rooms
            .get(room_id)
            .is_some_and(|stored| predicate.matches(&stored.row));
        if !matches {
            return Ok(0);
        }
        tables.rooms.remove(room_id);
        tables.notify(room_id, RoomChange::Deleted);
        Ok(1)
    }

    async fn find_or_create_match(
        &self,
        player_id: &PlayerId,
        game_type: &GameType,
    ) -> Result<RoomRow, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_online()?;

        let query = RoomQuery {
            newest_first: false,
            limit: None,
            ..RoomQuery::open_rooms(game_type.clone(), 0)
        };
        let mut open: Vec<(u64, RoomId, bool)> = tables
            .rooms
            .iter()
            .filter(|(_, stored)| query.matches(&stored.row))
            .map(|(id, stored)| {
                let own = stored.row.player1_id == player_id.as_str();
                (stored.sequence, id.clone(), own)
            })
            .collect();
        open.sort_by_key(|(sequence, _, _)| *sequence);

        if let Some((_, room_id, _)) = open.iter().find(|(_, _, own)| !own) {
            let patch = RoomPatch {
                status: Some(RoomStatus::Playing),
                player2_id: Some(player_id.clone()),
                ..RoomPatch::default()
            };
            let predicate = RoomPredicate::any()
                .with_status(RoomStatus::Waiting)
                .without_player2();
            tables.update(room_id, &predicate, &patch);
            if let Some(stored) = tables.rooms.get(room_id) {
                log!("[room:{}] Matched {} as second player", room_id, player_id);
                return Ok(stored.row.clone());
            }
        }

        if let Some((_, room_id, _)) = open.iter().find(|(_, _, own)| *own)
            && let Some(stored) = tables.rooms.get(room_id)
        {
            return Ok(stored.row.clone());
        }

        let row = tables.insert(NewRoom::waiting(player_id.clone(), game_type.clone(), false));
        log!("[room:{}] No open room, {} is now waiting", row.id, player_id);
        Ok(row)
    }

    async fn subscribe(&self, room_id: &RoomId) -> Result<RoomFeed, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.check_online()?;
        if tables.failing_subscribes > 0 {
            tables.failing_subscribes -= 1;
            return Err(StoreError::Unavailable("realtime endpoint unreachable".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        tables.feeds.entry(room_id.clone()).or_default().push(sender);
        Ok(receiver)
    }

    async fn select_profiles(&self, player_ids: &[PlayerId]) -> Result<Vec<PlayerProfile>, StoreError> {
        let tables = self.tables.lock().await;
        tables.check_online()?;
        Ok(player_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }
}
