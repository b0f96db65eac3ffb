use common::games::tictactoe::{Board, Mark};
use common::id_generator::room_id_from_invite_code;
use common::room::{Room, RoomStatus};
use common::store::RoomStore;
use common::{GameType, PlayerId, RoomId, log};
use tokio::time::Instant;

use crate::room_sync::{ConnectionStatus, RoomEvent, RoomSubscription, RoomSyncClient, SyncError};
use crate::stats::{GameRecord, GameResult, OpponentKind, StatsRecorder, report_game};
use super::{GameOutcome, MoveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlinePhase {
    Idle,
    Searching,
    Waiting,
    Playing,
    Finished,
}

fn status_rank(status: RoomStatus) -> u8 {
    match status {
        RoomStatus::Waiting => 0,
        RoomStatus::Playing => 1,
        RoomStatus::Finished => 2,
    }
}

/// An online game seen from one player. Owns the room subscription and
/// the local, possibly optimistic, board.
pub struct OnlineGameSession<S: RoomStore, R: StatsRecorder> {
    client: RoomSyncClient<S>,
    recorder: R,
    player_id: PlayerId,
    game_type: GameType,
    phase: OnlinePhase,
    room: Option<Room>,
    board: Board,
    subscription: Option<RoomSubscription<S>>,
    connection: ConnectionStatus,
    invite_code: Option<String>,
    started_at: Option<Instant>,
    reported_room: Option<RoomId>,
}

impl<S: RoomStore, R: StatsRecorder> OnlineGameSession<S, R> {
    pub fn new(client: RoomSyncClient<S>, recorder: R, player_id: PlayerId, game_type: GameType) -> Self {
        Self {
            client,
            recorder,
            player_id,
            game_type,
            phase: OnlinePhase::Idle,
            room: None,
            board: Board::new(),
            subscription: None,
            connection: ConnectionStatus::Disconnected,
            invite_code: None,
            started_at: None,
            reported_room: None,
        }
    }

    pub fn phase(&self) -> OnlinePhase {
        self.phase
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn board(&self) -> Board {
        self.board
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn invite_code(&self) -> Option<&str> {
        self.invite_code.as_deref()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn my_mark(&self) -> Option<Mark> {
        self.room.as_ref()?.mark_of(&self.player_id)
    }

    pub fn is_my_turn(&self) -> bool {
        self.phase == OnlinePhase::Playing
            && self
                .room
                .as_ref()
                .is_some_and(|room| room.is_turn_of(&self.player_id) && !room.board.is_game_over())
    }

    pub fn to_move(&self) -> Option<Mark> {
        let room = self.room.as_ref()?;
        if self.phase != OnlinePhase::Playing || room.board.is_game_over() {
            return None;
        }
        room.mark_of(&room.current_turn)
    }

    pub async fn find_match(&mut self) -> Result<OnlinePhase, SyncError> {
        self.leave().await?;
        self.phase = OnlinePhase::Searching;
        match self.client.find_or_create_match(&self.player_id, &self.game_type).await {
            Ok(room) => {
                self.enter_room(room).await;
                Ok(self.phase)
            }
            Err(e) => {
                self.phase = OnlinePhase::Idle;
                Err(e)
            }
        }
    }

    /// Opens a private room and returns the invite code for it.
    pub async fn create_private(&mut self) -> Result<String, SyncError> {
        self.leave().await?;
        self.phase = OnlinePhase::Searching;
        match self.client.create_private_room(&self.player_id, &self.game_type).await {
            Ok((room, code)) => {
                self.enter_room(room).await;
                self.invite_code = Some(code.clone());
                Ok(code)
            }
            Err(e) => {
                self.phase = OnlinePhase::Idle;
                Err(e)
            }
        }
    }

    pub async fn join_by_id(&mut self, room_id: &RoomId) -> Result<OnlinePhase, SyncError> {
        self.leave().await?;
        self.phase = OnlinePhase::Searching;
        match self.client.join_room_by_id(room_id, &self.player_id).await {
            Ok(room) => {
                self.enter_room(room).await;
                Ok(self.phase)
            }
            Err(e) => {
                self.phase = OnlinePhase::Idle;
                Err(e)
            }
        }
    }

    pub async fn join_by_invite(&mut self, code: &str) -> Result<OnlinePhase, SyncError> {
        let room_id = room_id_from_invite_code(code).ok_or_else(|| SyncError::NotFound(RoomId::new(code)))?;
        self.join_by_id(&room_id).await
    }

    /// Leaves the current room, if any, and goes back to idle.
    pub async fn leave(&mut self) -> Result<(), SyncError> {
        let result = match self.room.take() {
            Some(room) => self.client.leave_room(&room.id, &self.player_id).await.map(|_| ()),
            None => Ok(()),
        };
        self.reset().await;
        result
    }

    async fn reset(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        self.room = None;
        self.board = Board::new();
        self.phase = OnlinePhase::Idle;
        self.connection = ConnectionStatus::Disconnected;
        self.invite_code = None;
        self.started_at = None;
    }

    async fn enter_room(&mut self, room: Room) {
        let same_feed = self
            .subscription
            .as_ref()
            .is_some_and(|subscription| subscription.room_id() == &room.id);
        if !same_feed {
            if let Some(old) = self.subscription.take() {
                old.unsubscribe().await;
            }
            self.subscription = Some(self.client.subscribe_to_room(&room.id).await);
        }

        self.room = None;
        self.invite_code = None;
        self.started_at = None;
        self.apply_room_update(room);
    }

    /// Takes a server snapshot of the current room as the confirmed state.
    /// Snapshots of other rooms or older than the current one are dropped.
    pub fn apply_room_update(&mut self, room: Room) -> bool {
        if let Some(current) = &self.room
            && (current.id != room.id || Self::is_older(&room, current))
        {
            return false;
        }
        if !room.is_participant(&self.player_id) {
            return false;
        }

        self.board = room.board;
        self.phase = match room.status {
            RoomStatus::Waiting => OnlinePhase::Waiting,
            RoomStatus::Playing => OnlinePhase::Playing,
            RoomStatus::Finished => OnlinePhase::Finished,
        };
        if room.status != RoomStatus::Waiting && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.room = Some(room);

        if self.phase == OnlinePhase::Finished {
            self.report_outcome();
        }
        true
    }

    fn is_older(candidate: &Room, current: &Room) -> bool {
        status_rank(candidate.status) < status_rank(current.status)
            || candidate.move_count() < current.move_count()
            || candidate.updated_at < current.updated_at
    }

    fn report_outcome(&mut self) {
        let Some(room) = &self.room else {
            return;
        };
        if self.reported_room.as_ref() == Some(&room.id) {
            return;
        }
        let result = match &room.winner_id {
            Some(winner) if winner == &self.player_id => GameResult::Win,
            Some(_) => GameResult::Loss,
            None if room.is_draw => GameResult::Draw,
            None => return,
        };
        let Some(mark) = room.mark_of(&self.player_id) else {
            return;
        };

        let record = GameRecord {
            player_id: self.player_id.clone(),
            game_type: room.game_type.clone(),
            opponent: OpponentKind::Online,
            result,
            mark,
            move_count: room.move_count(),
            duration_seconds: self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0),
        };
        self.reported_room = Some(room.id.clone());
        report_game(&self.recorder, record);
    }

    /// Applies the move locally first, then submits it. A conflict puts the
    /// board back to the server's version.
    pub async fn place_mark(&mut self, index: usize) -> Result<MoveResult, SyncError> {
        if !self.is_my_turn() {
            return Ok(MoveResult::Ignored);
        }
        let Some(room) = self.room.clone() else {
            return Ok(MoveResult::Ignored);
        };
        let Some(mark) = room.mark_of(&self.player_id) else {
            return Ok(MoveResult::Ignored);
        };
        let Ok(optimistic) = room.board.make_move(index, mark) else {
            return Ok(MoveResult::Ignored);
        };
        self.board = optimistic;

        let outcome = match self
            .client
            .make_move(&room.id, index, &self.player_id, optimistic, Some(room.board))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.board = room.board;
                return Err(e);
            }
        };

        if !outcome.success {
            log!("[room:{}] Move {} rolled back after conflict", room.id, index);
            self.board = room.board;
            if let Some(current) = outcome.current_room {
                self.apply_room_update(current);
            }
            return Ok(MoveResult::Conflict);
        }

        match outcome.current_room {
            Some(current) => {
                self.apply_room_update(current);
            }
            None => {
                let mut confirmed = room.clone();
                confirmed.board = optimistic;
                if let Some(next) = room.opponent_of(&self.player_id) {
                    confirmed.current_turn = next.clone();
                }
                self.room = Some(confirmed);
            }
        }

        match GameOutcome::of(&optimistic) {
            Some(game_outcome) => {
                self.finish_game(game_outcome).await?;
                Ok(MoveResult::Finished(game_outcome))
            }
            None => Ok(MoveResult::Continue),
        }
    }

    async fn finish_game(&mut self, outcome: GameOutcome) -> Result<(), SyncError> {
        let Some(room) = self.room.clone() else {
            return Ok(());
        };
        let winner = match outcome {
            GameOutcome::Won(line) => room.player_with_mark(line.winner).cloned(),
            GameOutcome::Draw => None,
        };
        let is_draw = outcome == GameOutcome::Draw;

        self.client
            .end_game(&room.id, winner.as_ref(), is_draw, Some(room.board))
            .await?;
        if let Some(fresh) = self.client.fetch_room(&room.id).await? {
            self.apply_room_update(fresh);
        }
        Ok(())
    }

    /// Waits for the next push on the current room and applies it.
    /// `None` when not in a room.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        let event = self.subscription.as_mut()?.recv().await?;
        if let Err(e) = self.handle_event(event.clone()).await {
            log!("[room:{}] Failed to process update: {}", self.room_label(), e);
        }
        Some(event)
    }

    fn room_label(&self) -> String {
        self.room
            .as_ref()
            .map(|room| room.id.to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    pub async fn handle_event(&mut self, event: RoomEvent) -> Result<(), SyncError> {
        match event {
            RoomEvent::Updated(room) => {
                if !self.apply_room_update(room) {
                    return Ok(());
                }
                // The mover normally closes the game; finish it from this
                // side too in case they went away first.
                if self.phase == OnlinePhase::Playing
                    && let Some(outcome) = GameOutcome::of(&self.board)
                {
                    self.finish_game(outcome).await?;
                }
                self.follow_rematch().await?;
            }
            RoomEvent::Deleted => {
                log!("[room:{}] Room is gone", self.room_label());
                self.reset().await;
            }
            RoomEvent::Status(status) => self.connection = status,
            RoomEvent::Failed(error) => {
                log!("[room:{}] Connection lost for good: {}", self.room_label(), error);
                self.connection = ConnectionStatus::Disconnected;
            }
        }
        Ok(())
    }

    /// The requester moves over to the rematch room once the other side
    /// links it.
    async fn follow_rematch(&mut self) -> Result<(), SyncError> {
        let Some(room) = &self.room else {
            return Ok(());
        };
        if room.status != RoomStatus::Finished || room.rematch_requested_by.as_ref() != Some(&self.player_id) {
            return Ok(());
        }
        let Some(next_id) = room.rematch_room_id.clone() else {
            return Ok(());
        };

        if let Some(next) = self.client.fetch_room(&next_id).await? {
            log!("[room:{}] Following rematch into {}", room.id, next_id);
            self.enter_room(next).await;
        }
        Ok(())
    }

    pub async fn request_rematch(&mut self) -> Result<bool, SyncError> {
        let Some(room_id) = self.room.as_ref().map(|room| room.id.clone()) else {
            return Ok(false);
        };
        let requested = self.client.request_rematch(&room_id, &self.player_id).await?;
        if let Some(fresh) = self.client.fetch_room(&room_id).await? {
            self.apply_room_update(fresh);
        }
        Ok(requested)
    }

    pub async fn accept_rematch(&mut self) -> Result<(), SyncError> {
        let Some(room_id) = self.room.as_ref().map(|room| room.id.clone()) else {
            return Ok(());
        };
        let next = self.client.accept_rematch(&room_id, &self.player_id).await?;
        self.enter_room(next).await;
        Ok(())
    }

    pub async fn decline_rematch(&mut self) -> Result<bool, SyncError> {
        let Some(room_id) = self.room.as_ref().map(|room| room.id.clone()) else {
            return Ok(false);
        };
        let declined = self.client.decline_rematch(&room_id, &self.player_id).await?;
        if let Some(fresh) = self.client.fetch_room(&room_id).await? {
            self.apply_room_update(fresh);
        }
        Ok(declined)
    }

    /// Restarts the room feed after it gave up reconnecting.
    pub async fn reconnect(&mut self) -> bool {
        match &self.room {
            Some(room) => self.client.reconnect(&room.id).await,
            None => false,
        }
    }
}
