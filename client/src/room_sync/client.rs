use common::games::tictactoe::{Board, CELL_COUNT};
use common::id_generator::generate_invite_code;
use common::room::{
    NewRoom, Room, RoomPatch, RoomPredicate, RoomQuery, RoomRow, RoomStatus, RoomView,
};
use common::store::RoomStore;
use common::{GameType, PlayerId, RoomId, log};

use crate::config::SyncConfig;
use super::error::SyncError;
use super::subscription::{RoomSubscription, SubscriptionHub};

/// Result of a move submission. A lost race is `conflict`, not an error;
/// `current_room` then carries the server state to resync from.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub success: bool,
    pub conflict: bool,
    pub current_room: Option<Room>,
}

impl MoveOutcome {
    fn applied(current_room: Option<Room>) -> Self {
        Self {
            success: true,
            conflict: false,
            current_room,
        }
    }

    fn conflict(current_room: Option<Room>) -> Self {
        Self {
            success: false,
            conflict: true,
            current_room,
        }
    }
}

pub fn invite_code(room: &Room) -> String {
    generate_invite_code(&room.id)
}

/// Client side of the room protocol. Every write that can race with the
/// other player is a conditional update against the store.
#[derive(Clone)]
pub struct RoomSyncClient<S: RoomStore> {
    store: S,
    config: SyncConfig,
    hub: SubscriptionHub<S>,
}

impl<S: RoomStore> std::fmt::Debug for RoomSyncClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSyncClient").finish()
    }
}

impl<S: RoomStore> RoomSyncClient<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        let hub = SubscriptionHub::new(store.clone(), config.reconnect.clone());
        Self { store, config, hub }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode(row: RoomRow) -> Result<Room, SyncError> {
        Room::try_from(row).map_err(|e| {
            log!("Rejected malformed room row: {}", e);
            SyncError::Decode(e)
        })
    }

    pub async fn fetch_room(&self, room_id: &RoomId) -> Result<Option<Room>, SyncError> {
        match self.store.select_room(room_id).await? {
            Some(row) => Ok(Some(Self::decode(row)?)),
            None => Ok(None),
        }
    }

    async fn require_room(&self, room_id: &RoomId) -> Result<Room, SyncError> {
        self.fetch_room(room_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(room_id.clone()))
    }

    async fn insert(&self, new_room: NewRoom) -> Result<Room, SyncError> {
        let row = self
            .store
            .insert_room(new_room)
            .await
            .map_err(SyncError::CreateFailed)?;
        Self::decode(row)
    }

    pub async fn create_room(&self, player_id: &PlayerId, game_type: &GameType) -> Result<Room, SyncError> {
        let room = self
            .insert(NewRoom::waiting(player_id.clone(), game_type.clone(), false))
            .await?;
        log!("[room:{}] Created by {}", room.id, player_id);
        Ok(room)
    }

    /// Creates a room that never shows up in matchmaking. Returns the room
    /// and the invite code to share.
    pub async fn create_private_room(
        &self,
        player_id: &PlayerId,
        game_type: &GameType,
    ) -> Result<(Room, String), SyncError> {
        let room = self
            .insert(NewRoom::waiting(player_id.clone(), game_type.clone(), true))
            .await?;
        log!("[room:{}] Private room created by {}", room.id, player_id);
        let code = invite_code(&room);
        Ok((room, code))
    }

    pub async fn find_available_rooms(&self, game_type: &GameType) -> Result<Vec<Room>, SyncError> {
        let query = RoomQuery::open_rooms(game_type.clone(), self.config.available_rooms_limit);
        let rows = self.store.select_rooms(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Self::decode(row).ok())
            .collect())
    }

    pub async fn find_or_create_match(
        &self,
        player_id: &PlayerId,
        game_type: &GameType,
    ) -> Result<Room, SyncError> {
        let row = self.store.find_or_create_match(player_id, game_type).await?;
        let room = Self::decode(row)?;
        log!("[room:{}] Matchmaking for {} gave status {}", room.id, player_id, room.status);
        Ok(room)
    }

    /// Claims the second seat. `None` when the room was no longer open.
    pub async fn join_room(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<Option<Room>, SyncError> {
        let predicate = RoomPredicate::any()
            .with_status(RoomStatus::Waiting)
            .without_player2();
        let patch = RoomPatch {
            status: Some(RoomStatus::Playing),
            player2_id: Some(player_id.clone()),
            ..RoomPatch::default()
        };

        let affected = self.store.conditional_update(room_id, &predicate, &patch).await?;
        if affected == 0 {
            log!("[room:{}] {} lost the race to join", room_id, player_id);
            return Ok(None);
        }
        log!("[room:{}] {} joined", room_id, player_id);
        self.fetch_room(room_id).await
    }

    pub async fn join_room_by_id(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<Room, SyncError> {
        let room = self.require_room(room_id).await?;
        if room.status != RoomStatus::Waiting || room.player1_id == *player_id {
            return Err(SyncError::NotAvailable(room_id.clone()));
        }
        if room.player2_id.is_some() {
            return Err(SyncError::Full(room_id.clone()));
        }

        self.join_room(room_id, player_id)
            .await?
            .ok_or_else(|| SyncError::Full(room_id.clone()))
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomView>, SyncError> {
        let Some(room) = self.fetch_room(room_id).await? else {
            return Ok(None);
        };

        let mut player_ids = vec![room.player1_id.clone()];
        player_ids.extend(room.player2_id.clone());
        let profiles = self.store.select_profiles(&player_ids).await?;
        let find = |id: Option<&PlayerId>| {
            id.and_then(|id| profiles.iter().find(|profile| &profile.id == id).cloned())
        };

        Ok(Some(RoomView {
            player1: find(Some(&room.player1_id)),
            player2: find(room.player2_id.as_ref()),
            room,
        }))
    }

    /// Submits `new_board` as the result of `player_id` marking `cell_index`.
    /// `expected_board` is the board the caller last saw from the server.
    pub async fn make_move(
        &self,
        room_id: &RoomId,
        cell_index: usize,
        player_id: &PlayerId,
        new_board: Board,
        expected_board: Option<Board>,
    ) -> Result<MoveOutcome, SyncError> {
        if cell_index >= CELL_COUNT {
            return Err(SyncError::InvalidMove(cell_index));
        }

        let room = self.require_room(room_id).await?;
        if let Some(reason) = Self::move_rejection(&room, cell_index, player_id, &new_board, expected_board) {
            log!("[room:{}] Move {} by {} refused: {}", room_id, cell_index, player_id, reason);
            return Ok(MoveOutcome::conflict(Some(room)));
        }

        let Some(next_turn) = room.opponent_of(player_id).cloned() else {
            return Ok(MoveOutcome::conflict(Some(room)));
        };
        let predicate = RoomPredicate::any()
            .with_status(RoomStatus::Playing)
            .with_current_turn(player_id.clone());
        let patch = RoomPatch {
            board: Some(new_board),
            current_turn: Some(next_turn),
            ..RoomPatch::default()
        };

        let affected = self.store.conditional_update(room_id, &predicate, &patch).await?;
        if affected == 0 {
            log!("[room:{}] Move {} by {} lost the race", room_id, cell_index, player_id);
            let fresh = self.fetch_room(room_id).await?;
            return Ok(MoveOutcome::conflict(fresh));
        }

        log!("[room:{}] {} marked cell {}", room_id, player_id, cell_index);
        let current_room = match self.fetch_room(room_id).await {
            Ok(room) => room,
            Err(e) => {
                log!("[room:{}] Move stored but re-read failed: {}", room_id, e);
                None
            }
        };
        Ok(MoveOutcome::applied(current_room))
    }

    fn move_rejection(
        room: &Room,
        cell_index: usize,
        player_id: &PlayerId,
        new_board: &Board,
        expected_board: Option<Board>,
    ) -> Option<&'static str> {
        if room.status != RoomStatus::Playing {
            return Some("room is not playing");
        }
        if room.current_turn != *player_id {
            return Some("not this player's turn");
        }
        if !room.board.is_valid_move(cell_index) {
            return Some("cell already taken");
        }
        if room.board.is_game_over() {
            return Some("game already decided");
        }
        if expected_board.is_some_and(|expected| expected != room.board) {
            return Some("stale board");
        }
        let Some(mark) = room.mark_of(player_id) else {
            return Some("not a participant");
        };
        if room.board.make_move(cell_index, mark).ok() != Some(*new_board) {
            return Some("submitted board does not match the move");
        }
        None
    }

    /// Finishes a game still in progress. `false` means someone else already
    /// finished it.
    pub async fn end_game(
        &self,
        room_id: &RoomId,
        winner_id: Option<&PlayerId>,
        is_draw: bool,
        final_board: Option<Board>,
    ) -> Result<bool, SyncError> {
        let predicate = RoomPredicate::any().with_status(RoomStatus::Playing);
        let patch = RoomPatch {
            status: Some(RoomStatus::Finished),
            winner_id: Some(winner_id.cloned()),
            is_draw: Some(is_draw),
            board: final_board,
            ..RoomPatch::default()
        };

        let affected = self.store.conditional_update(room_id, &predicate, &patch).await?;
        if affected == 0 {
            log!("[room:{}] Game was already finished", room_id);
            return Ok(false);
        }
        match winner_id {
            Some(winner) => log!("[room:{}] Game over, {} won", room_id, winner),
            None => log!("[room:{}] Game over, draw", room_id),
        }
        Ok(true)
    }

    /// Leaving a waiting room deletes it; leaving a game in progress hands
    /// the win to the other player.
    pub async fn leave_room(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<bool, SyncError> {
        let Some(mut room) = self.fetch_room(room_id).await? else {
            return Ok(true);
        };
        if !room.is_participant(player_id) {
            log!("[room:{}] {} is not in this room, nothing to leave", room_id, player_id);
            return Ok(true);
        }

        if room.status == RoomStatus::Waiting && room.player1_id == *player_id {
            let predicate = RoomPredicate::any()
                .with_status(RoomStatus::Waiting)
                .without_player2();
            if self.store.delete_room(room_id, &predicate).await? > 0 {
                log!("[room:{}] Deleted, creator {} left", room_id, player_id);
                return Ok(true);
            }
            // Somebody joined between the read and the delete.
            match self.fetch_room(room_id).await? {
                Some(fresh) => room = fresh,
                None => return Ok(true),
            }
        }

        if room.status == RoomStatus::Playing
            && let Some(winner) = room.opponent_of(player_id).cloned()
        {
            log!("[room:{}] {} left a running game", room_id, player_id);
            self.end_game(room_id, Some(&winner), false, None).await?;
        }
        Ok(true)
    }

    async fn finished_room_of(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<Room, SyncError> {
        let room = self.require_room(room_id).await?;
        if !room.is_participant(player_id) {
            return Err(SyncError::NotParticipant {
                room_id: room_id.clone(),
                player_id: player_id.clone(),
            });
        }
        if room.status != RoomStatus::Finished {
            return Err(SyncError::InvalidRematch {
                room_id: room_id.clone(),
                reason: "game is not finished".to_string(),
            });
        }
        Ok(room)
    }

    /// `false` when a request was already pending or the rematch already
    /// happened.
    pub async fn request_rematch(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<bool, SyncError> {
        let room = self.finished_room_of(room_id, player_id).await?;
        if room.rematch_requested_by.as_ref() == Some(player_id) {
            return Ok(true);
        }

        let predicate = RoomPredicate::any()
            .with_status(RoomStatus::Finished)
            .without_rematch_request()
            .without_rematch_room();
        let patch = RoomPatch {
            rematch_requested_by: Some(Some(player_id.clone())),
            ..RoomPatch::default()
        };

        let requested = self.store.conditional_update(room_id, &predicate, &patch).await? > 0;
        if requested {
            log!("[room:{}] {} asked for a rematch", room_id, player_id);
        }
        Ok(requested)
    }

    /// Starts the rematch room with roles swapped and links it from the old
    /// room. Accepting twice, or racing another accept, yields the one
    /// linked room.
    pub async fn accept_rematch(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<Room, SyncError> {
        let room = self.finished_room_of(room_id, player_id).await?;
        if let Some(linked) = &room.rematch_room_id {
            return self.require_room(linked).await;
        }
        match &room.rematch_requested_by {
            Some(requester) if requester != player_id => {}
            Some(_) => {
                return Err(SyncError::InvalidRematch {
                    room_id: room_id.clone(),
                    reason: "cannot accept your own request".to_string(),
                });
            }
            None => {
                return Err(SyncError::InvalidRematch {
                    room_id: room_id.clone(),
                    reason: "no rematch was requested".to_string(),
                });
            }
        }

        let new_room = NewRoom::rematch_of(&room).ok_or_else(|| SyncError::InvalidRematch {
            room_id: room_id.clone(),
            reason: "room has no second player".to_string(),
        })?;
        let new_room = self.insert(new_room).await?;

        let predicate = RoomPredicate::any()
            .with_status(RoomStatus::Finished)
            .without_rematch_room();
        let patch = RoomPatch {
            rematch_room_id: Some(new_room.id.clone()),
            ..RoomPatch::default()
        };
        if self.store.conditional_update(room_id, &predicate, &patch).await? > 0 {
            log!("[room:{}] Rematch accepted by {}, continuing in {}", room_id, player_id, new_room.id);
            return Ok(new_room);
        }

        log!("[room:{}] Rematch was already linked, dropping {}", room_id, new_room.id);
        self.store.delete_room(&new_room.id, &RoomPredicate::any()).await?;
        let linked = self
            .require_room(room_id)
            .await?
            .rematch_room_id
            .ok_or_else(|| SyncError::InvalidRematch {
                room_id: room_id.clone(),
                reason: "rematch link vanished".to_string(),
            })?;
        self.require_room(&linked).await
    }

    pub async fn decline_rematch(&self, room_id: &RoomId, player_id: &PlayerId) -> Result<bool, SyncError> {
        let room = self.finished_room_of(room_id, player_id).await?;
        if room.rematch_requested_by.is_none() {
            return Ok(false);
        }

        let predicate = RoomPredicate::any()
            .with_status(RoomStatus::Finished)
            .without_rematch_room();
        let patch = RoomPatch {
            rematch_requested_by: Some(None),
            ..RoomPatch::default()
        };
        let declined = self.store.conditional_update(room_id, &predicate, &patch).await? > 0;
        if declined {
            log!("[room:{}] Rematch declined by {}", room_id, player_id);
        }
        Ok(declined)
    }

    pub async fn subscribe_to_room(&self, room_id: &RoomId) -> RoomSubscription<S> {
        self.hub.subscribe(room_id).await
    }

    /// Restarts the feed of a room whose reconnect budget ran out. Returns
    /// `false` when nobody is subscribed or the feed is still running.
    pub async fn reconnect(&self, room_id: &RoomId) -> bool {
        self.hub.reconnect(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use common::games::tictactoe::Mark;
    use common::room::PlayerProfile;
    use common::store::{MemoryStore, RoomFeed, StoreError};

    fn alice() -> PlayerId {
        PlayerId::new("alice")
    }

    fn bob() -> PlayerId {
        PlayerId::new("bob")
    }

    fn carol() -> PlayerId {
        PlayerId::new("carol")
    }

    fn new_client() -> RoomSyncClient<MemoryStore> {
        RoomSyncClient::new(MemoryStore::new(), SyncConfig::default())
    }

    async fn playing_room(client: &RoomSyncClient<MemoryStore>) -> Room {
        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();
        client.join_room(&room.id, &bob()).await.unwrap().unwrap()
    }

    async fn play(client: &RoomSyncClient<MemoryStore>, room: &Room, moves: &[usize]) -> Room {
        let mut room = room.clone();
        for &index in moves {
            let player = room.current_turn.clone();
            let mark = room.mark_of(&player).unwrap();
            let next = room.board.make_move(index, mark).unwrap();
            let outcome = client
                .make_move(&room.id, index, &player, next, Some(room.board))
                .await
                .unwrap();
            assert!(outcome.success, "move {} failed", index);
            room = outcome.current_room.unwrap();
        }
        room
    }

    #[tokio::test]
    async fn test_create_room_waits_for_second_player() {
        let client = new_client();

        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();

        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.player1_id, alice());
        assert_eq!(room.current_turn, alice());
        assert_eq!(room.player2_id, None);
        assert!(room.board.is_empty());
        assert!(!room.is_private);
    }

    #[tokio::test]
    async fn test_create_room_reports_store_failure() {
        let client = new_client();
        client.store().set_offline(true).await;

        let result = client.create_room(&alice(), &GameType::tictactoe()).await;

        assert!(matches!(result, Err(SyncError::CreateFailed(_))));
    }

    #[tokio::test]
    async fn test_private_room_is_hidden_and_joinable_by_invite() {
        let client = new_client();
        let (room, code) = client
            .create_private_room(&alice(), &GameType::tictactoe())
            .await
            .unwrap();

        let available = client.find_available_rooms(&GameType::tictactoe()).await.unwrap();
        assert!(available.is_empty());

        let room_id = common::id_generator::room_id_from_invite_code(&code).unwrap();
        assert_eq!(room_id, room.id);
        let joined = client.join_room_by_id(&room_id, &bob()).await.unwrap();
        assert_eq!(joined.status, RoomStatus::Playing);
        assert!(joined.is_private);
    }

    #[tokio::test]
    async fn test_available_rooms_are_newest_first_and_capped() {
        let store = MemoryStore::new();
        let config = SyncConfig {
            available_rooms_limit: 2,
            ..SyncConfig::default()
        };
        let client = RoomSyncClient::new(store, config);
        for name in ["p1", "p2", "p3"] {
            client
                .create_room(&PlayerId::new(name), &GameType::tictactoe())
                .await
                .unwrap();
        }

        let rooms = client.find_available_rooms(&GameType::tictactoe()).await.unwrap();

        let owners: Vec<&str> = rooms.iter().map(|r| r.player1_id.as_str()).collect();
        assert_eq!(owners, vec!["p3", "p2"]);
    }

    #[tokio::test]
    async fn test_available_rooms_skip_malformed_rows() {
        let client = new_client();
        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();
        let mut broken = RoomRow::from(&room);
        broken.id = "room_broken".to_string();
        broken.board = vec!["Z".to_string(); 9];
        client.store().put_raw_row(broken).await;

        let rooms = client.find_available_rooms(&GameType::tictactoe()).await.unwrap();

        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, room.id);
    }

    #[tokio::test]
    async fn test_concurrent_matchmaking_pairs_players() {
        let client = new_client();
        let other = client.clone();

        let (a, b, game_type) = (alice(), bob(), GameType::tictactoe());

        let (first, second) = tokio::join!(
            client.find_or_create_match(&a, &game_type),
            other.find_or_create_match(&b, &game_type),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.id, second.id);
        assert_eq!(client.store().room_count().await, 1);
        let room = client.fetch_room(&first.id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert!(room.is_participant(&alice()) && room.is_participant(&bob()));
    }

    #[tokio::test]
    async fn test_matchmaking_reuses_own_waiting_room() {
        let client = new_client();

        let first = client.find_or_create_match(&alice(), &GameType::tictactoe()).await.unwrap();
        let again = client.find_or_create_match(&alice(), &GameType::tictactoe()).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.status, RoomStatus::Waiting);
    }

    #[tokio::test]
    async fn test_second_join_loses_race() {
        let client = new_client();
        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();

        let (b, c) = (bob(), carol());

        let (first, second) = tokio::join!(client.join_room(&room.id, &b), client.join_room(&room.id, &c));

        let joined: Vec<Room> = [first.unwrap(), second.unwrap()].into_iter().flatten().collect();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].status, RoomStatus::Playing);
    }

    #[tokio::test]
    async fn test_join_by_id_errors() {
        let client = new_client();
        let missing = RoomId::new("room_404");
        assert_eq!(
            client.join_room_by_id(&missing, &bob()).await,
            Err(SyncError::NotFound(missing))
        );

        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();
        assert_eq!(
            client.join_room_by_id(&room.id, &alice()).await,
            Err(SyncError::NotAvailable(room.id.clone()))
        );

        client.join_room_by_id(&room.id, &bob()).await.unwrap();
        assert_eq!(
            client.join_room_by_id(&room.id, &carol()).await,
            Err(SyncError::NotAvailable(room.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_get_room_attaches_profiles() {
        let client = new_client();
        client
            .store()
            .upsert_profile(PlayerProfile::new(alice(), "Alice"))
            .await;
        let room = playing_room(&client).await;

        let view = client.get_room(&room.id).await.unwrap().unwrap();

        assert_eq!(view.display_name_of(&alice()), Some("Alice"));
        assert_eq!(view.player2, None);
        assert_eq!(view.room.id, room.id);
        assert_eq!(client.get_room(&RoomId::new("room_404")).await, Ok(None));
    }

    #[tokio::test]
    async fn test_move_passes_turn() {
        let client = new_client();
        let room = playing_room(&client).await;

        let room = play(&client, &room, &[4]).await;

        assert_eq!(room.board.cell(4), Some(Mark::X));
        assert_eq!(room.current_turn, bob());
    }

    #[tokio::test]
    async fn test_move_out_of_range_is_invalid() {
        let client = new_client();
        let room = playing_room(&client).await;

        let result = client.make_move(&room.id, 9, &alice(), room.board, None).await;

        assert_eq!(result, Err(SyncError::InvalidMove(9)));
    }

    #[tokio::test]
    async fn test_move_out_of_turn_conflicts() {
        let client = new_client();
        let room = playing_room(&client).await;
        let board = room.board.make_move(0, Mark::O).unwrap();

        let outcome = client.make_move(&room.id, 0, &bob(), board, Some(room.board)).await.unwrap();

        assert!(outcome.conflict);
        assert!(!outcome.success);
        assert_eq!(outcome.current_room.unwrap().board, Board::new());
    }

    #[tokio::test]
    async fn test_concurrent_moves_leave_one_winner() {
        let client = new_client();
        let room = playing_room(&client).await;
        let first = room.board.make_move(0, Mark::X).unwrap();
        let second = room.board.make_move(8, Mark::X).unwrap();

        let player = alice();

        let (a, b) = tokio::join!(
            client.make_move(&room.id, 0, &player, first, Some(room.board)),
            client.make_move(&room.id, 8, &player, second, Some(room.board)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.success != b.success);
        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.board.count_moves(), 1);
        let loser = if a.success { b } else { a };
        assert!(loser.conflict);
        assert_eq!(loser.current_room.unwrap().board, stored.board);
    }

    /// Ends the game right before the next board write reaches the store,
    /// after the client's own re-read already saw it playing.
    #[derive(Clone)]
    struct FinishingStore {
        inner: MemoryStore,
        armed: Arc<AtomicBool>,
    }

    impl RoomStore for FinishingStore {
        async fn insert_room(&self, room: NewRoom) -> Result<RoomRow, StoreError> {
            self.inner.insert_room(room).await
        }

        async fn select_room(&self, room_id: &RoomId) -> Result<Option<RoomRow>, StoreError> {
            self.inner.select_room(room_id).await
        }

        async fn select_rooms(&self, query: &RoomQuery) -> Result<Vec<RoomRow>, StoreError> {
            self.inner.select_rooms(query).await
        }

        async fn conditional_update(
            &self,
            room_id: &RoomId,
            predicate: &RoomPredicate,
            patch: &RoomPatch,
        ) -> Result<u64, StoreError> {
            if patch.board.is_some() && self.armed.swap(false, Ordering::SeqCst) {
                let finish = RoomPatch {
                    status: Some(RoomStatus::Finished),
                    winner_id: Some(None),
                    is_draw: Some(true),
                    ..RoomPatch::default()
                };
                self.inner.update_room(room_id, &finish).await?;
            }
            self.inner.conditional_update(room_id, predicate, patch).await
        }

        async fn delete_room(&self, room_id: &RoomId, predicate: &RoomPredicate) -> Result<u64, StoreError> {
            self.inner.delete_room(room_id, predicate).await
        }

        async fn find_or_create_match(&self, player_id: &PlayerId, game_type: &GameType) -> Result<RoomRow, StoreError> {
            self.inner.find_or_create_match(player_id, game_type).await
        }

        async fn subscribe(&self, room_id: &RoomId) -> Result<RoomFeed, StoreError> {
            self.inner.subscribe(room_id).await
        }

        async fn select_profiles(&self, player_ids: &[PlayerId]) -> Result<Vec<PlayerProfile>, StoreError> {
            self.inner.select_profiles(player_ids).await
        }
    }

    #[tokio::test]
    async fn test_move_losing_the_conditional_write_conflicts() {
        let armed = Arc::new(AtomicBool::new(false));
        let store = FinishingStore {
            inner: MemoryStore::new(),
            armed: armed.clone(),
        };
        let client = RoomSyncClient::new(store, SyncConfig::default());
        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();
        let room = client.join_room(&room.id, &bob()).await.unwrap().unwrap();
        let next = room.board.make_move(4, Mark::X).unwrap();
        armed.store(true, Ordering::SeqCst);

        let outcome = client
            .make_move(&room.id, 4, &alice(), next, Some(room.board))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.conflict);
        let fresh = outcome.current_room.unwrap();
        assert_eq!(fresh.status, RoomStatus::Finished);
        assert!(fresh.board.is_empty());
    }

    #[tokio::test]
    async fn test_stale_expected_board_conflicts_without_writing() {
        let client = new_client();
        let room = playing_room(&client).await;
        let room = play(&client, &room, &[4, 0]).await;
        let stale = Board::new();
        let attempt = stale.make_move(8, Mark::X).unwrap();

        let outcome = client
            .make_move(&room.id, 8, &alice(), attempt, Some(stale))
            .await
            .unwrap();

        assert!(outcome.conflict);
        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.board, room.board);
    }

    #[tokio::test]
    async fn test_forged_board_conflicts() {
        let client = new_client();
        let room = playing_room(&client).await;
        let forged = Board::new()
            .make_move(0, Mark::X)
            .unwrap()
            .make_move(1, Mark::X)
            .unwrap();

        let outcome = client.make_move(&room.id, 0, &alice(), forged, None).await.unwrap();

        assert!(outcome.conflict);
    }

    #[tokio::test]
    async fn test_move_after_decided_board_conflicts() {
        let client = new_client();
        let room = playing_room(&client).await;
        let room = play(&client, &room, &[0, 3, 1, 4, 2]).await;

        let next = room.board.make_move(8, Mark::O).unwrap();
        let outcome = client.make_move(&room.id, 8, &bob(), next, Some(room.board)).await.unwrap();

        assert!(outcome.conflict);
    }

    #[tokio::test]
    async fn test_end_game_only_once() {
        let client = new_client();
        let room = playing_room(&client).await;

        let first = client.end_game(&room.id, Some(&alice()), false, None).await.unwrap();
        let second = client.end_game(&room.id, Some(&bob()), false, None).await.unwrap();

        assert!(first);
        assert!(!second);
        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Finished);
        assert_eq!(stored.winner_id, Some(alice()));
    }

    #[tokio::test]
    async fn test_leaving_waiting_room_deletes_it() {
        let client = new_client();
        let room = client.create_room(&alice(), &GameType::tictactoe()).await.unwrap();

        assert_eq!(client.leave_room(&room.id, &alice()).await, Ok(true));

        assert_eq!(client.fetch_room(&room.id).await, Ok(None));
    }

    #[tokio::test]
    async fn test_leaving_running_game_forfeits() {
        let client = new_client();
        let room = playing_room(&client).await;

        assert_eq!(client.leave_room(&room.id, &bob()).await, Ok(true));

        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Finished);
        assert_eq!(stored.winner_id, Some(alice()));
        assert!(!stored.is_draw);
    }

    #[tokio::test]
    async fn test_outsider_leave_changes_nothing() {
        let client = new_client();
        let room = playing_room(&client).await;

        assert_eq!(client.leave_room(&room.id, &carol()).await, Ok(true));

        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoomStatus::Playing);
        assert_eq!(stored.winner_id, None);
    }

    #[tokio::test]
    async fn test_rematch_swaps_roles() {
        let client = new_client();
        let room = playing_room(&client).await;
        client.end_game(&room.id, None, true, None).await.unwrap();

        assert_eq!(client.request_rematch(&room.id, &alice()).await, Ok(true));
        let rematch = client.accept_rematch(&room.id, &bob()).await.unwrap();

        assert_ne!(rematch.id, room.id);
        assert_eq!(rematch.status, RoomStatus::Playing);
        assert_eq!(rematch.player1_id, bob());
        assert_eq!(rematch.player2_id, Some(alice()));
        assert_eq!(rematch.current_turn, bob());
        assert!(rematch.board.is_empty());
        let old = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(old.rematch_room_id, Some(rematch.id));
    }

    #[tokio::test]
    async fn test_rematch_cannot_be_accepted_by_requester() {
        let client = new_client();
        let room = playing_room(&client).await;
        client.end_game(&room.id, Some(&alice()), false, None).await.unwrap();
        client.request_rematch(&room.id, &alice()).await.unwrap();

        let result = client.accept_rematch(&room.id, &alice()).await;

        assert!(matches!(result, Err(SyncError::InvalidRematch { .. })));
    }

    #[tokio::test]
    async fn test_rematch_needs_finished_game() {
        let client = new_client();
        let room = playing_room(&client).await;

        let result = client.request_rematch(&room.id, &alice()).await;

        assert!(matches!(result, Err(SyncError::InvalidRematch { .. })));
    }

    #[tokio::test]
    async fn test_double_accept_yields_single_room() {
        let client = new_client();
        let room = playing_room(&client).await;
        client.end_game(&room.id, Some(&bob()), false, None).await.unwrap();
        client.request_rematch(&room.id, &alice()).await.unwrap();

        let accepter = bob();

        let (first, second) = tokio::join!(
            client.accept_rematch(&room.id, &accepter),
            client.accept_rematch(&room.id, &accepter),
        );

        assert_eq!(first.unwrap().id, second.unwrap().id);
        // Old room plus exactly one rematch room.
        assert_eq!(client.store().room_count().await, 2);
    }

    #[tokio::test]
    async fn test_decline_clears_request() {
        let client = new_client();
        let room = playing_room(&client).await;
        client.end_game(&room.id, None, true, None).await.unwrap();
        client.request_rematch(&room.id, &bob()).await.unwrap();

        assert_eq!(client.decline_rematch(&room.id, &alice()).await, Ok(true));

        let stored = client.fetch_room(&room.id).await.unwrap().unwrap();
        assert_eq!(stored.rematch_requested_by, None);
        assert!(matches!(
            client.accept_rematch(&room.id, &alice()).await,
            Err(SyncError::InvalidRematch { .. })
        ));
    }
}
