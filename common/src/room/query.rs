use crate::games::tictactoe::{Board, wire};
use crate::{GameType, PlayerId, RoomId};
use super::row::RoomRow;
use super::types::{Room, RoomStatus};

/// Values for a room insert. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoom {
    pub game_type: GameType,
    pub status: RoomStatus,
    pub player1_id: PlayerId,
    pub player2_id: Option<PlayerId>,
    pub current_turn: PlayerId,
    pub board: Board,
    pub is_private: bool,
}

impl NewRoom {
    pub fn waiting(player_id: PlayerId, game_type: GameType, is_private: bool) -> Self {
        Self {
            game_type,
            status: RoomStatus::Waiting,
            current_turn: player_id.clone(),
            player1_id: player_id,
            player2_id: None,
            board: Board::new(),
            is_private,
        }
    }

    /// Fresh room for a rematch: the previous second player becomes player 1
    /// and moves first.
    pub fn rematch_of(room: &Room) -> Option<Self> {
        let new_player1 = room.player2_id.clone()?;
        Some(Self {
            game_type: room.game_type.clone(),
            status: RoomStatus::Playing,
            current_turn: new_player1.clone(),
            player1_id: new_player1,
            player2_id: Some(room.player1_id.clone()),
            board: Board::new(),
            is_private: room.is_private,
        })
    }
}

/// Column changes for an update. `None` leaves a column untouched; the
/// nested options on nullable columns distinguish "clear" from "keep".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub player2_id: Option<PlayerId>,
    pub current_turn: Option<PlayerId>,
    pub board: Option<Board>,
    pub winner_id: Option<Option<PlayerId>>,
    pub is_draw: Option<bool>,
    pub rematch_requested_by: Option<Option<PlayerId>>,
    pub rematch_room_id: Option<RoomId>,
}

impl RoomPatch {
    pub fn is_empty(&self) -> bool {
        *self == RoomPatch::default()
    }

    pub fn apply_to(&self, row: &mut RoomRow) {
        if let Some(status) = self.status {
            row.status = status.as_str().to_string();
        }
        if let Some(player2_id) = &self.player2_id {
            row.player2_id = Some(player2_id.to_string());
        }
        if let Some(current_turn) = &self.current_turn {
            row.current_turn = current_turn.to_string();
        }
        if let Some(board) = &self.board {
            row.board = wire::encode(board);
        }
        if let Some(winner_id) = &self.winner_id {
            row.winner_id = winner_id.as_ref().map(PlayerId::to_string);
        }
        if let Some(is_draw) = self.is_draw {
            row.is_draw = is_draw;
        }
        if let Some(requested_by) = &self.rematch_requested_by {
            row.rematch_requested_by = requested_by.as_ref().map(PlayerId::to_string);
        }
        if let Some(rematch_room_id) = &self.rematch_room_id {
            row.rematch_room_id = Some(rematch_room_id.to_string());
        }
    }
}

/// Conjunction of column conditions a row must satisfy for a conditional
/// update or delete to apply. The default matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPredicate {
    pub status: Option<RoomStatus>,
    pub current_turn: Option<PlayerId>,
    pub player2_absent: bool,
    pub rematch_requested_by_absent: bool,
    pub rematch_room_absent: bool,
}

impl RoomPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RoomStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_current_turn(mut self, player_id: PlayerId) -> Self {
        self.current_turn = Some(player_id);
        self
    }

    pub fn without_player2(mut self) -> Self {
        self.player2_absent = true;
        self
    }

    pub fn without_rematch_request(mut self) -> Self {
        self.rematch_requested_by_absent = true;
        self
    }

    pub fn without_rematch_room(mut self) -> Self {
        self.rematch_room_absent = true;
        self
    }

    pub fn matches(&self, row: &RoomRow) -> bool {
        if let Some(status) = self.status
            && row.status != status.as_str()
        {
            return false;
        }
        if let Some(current_turn) = &self.current_turn
            && row.current_turn != current_turn.as_str()
        {
            return false;
        }
        if self.player2_absent && row.player2_id.is_some() {
            return false;
        }
        if self.rematch_requested_by_absent && row.rematch_requested_by.is_some() {
            return false;
        }
        if self.rematch_room_absent && row.rematch_room_id.is_some() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomQuery {
    pub game_type: Option<GameType>,
    pub status: Option<RoomStatus>,
    pub player2_absent: bool,
    pub is_private: Option<bool>,
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl RoomQuery {
    /// Public rooms of `game_type` still waiting for a second player,
    /// newest first.
    pub fn open_rooms(game_type: GameType, limit: usize) -> Self {
        Self {
            game_type: Some(game_type),
            status: Some(RoomStatus::Waiting),
            player2_absent: true,
            is_private: Some(false),
            newest_first: true,
            limit: Some(limit),
        }
    }

    pub fn matches(&self, row: &RoomRow) -> bool {
        if let Some(game_type) = &self.game_type
            && row.game_type != game_type.as_str()
        {
            return false;
        }
        if let Some(status) = self.status
            && row.status != status.as_str()
        {
            return false;
        }
        if self.player2_absent && row.player2_id.is_some() {
            return false;
        }
        if let Some(is_private) = self.is_private
            && row.is_private != is_private
        {
            return false;
        }
        true
    }
}
