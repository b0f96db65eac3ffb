use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::games::tictactoe::{Board, Mark};
use crate::{GameType, PlayerId, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "playing" => Ok(RoomStatus::Playing),
            "finished" => Ok(RoomStatus::Finished),
            other => Err(format!("Unknown room status: {}", other)),
        }
    }
}

/// Typed view of one online match. Built only through
/// `Room::try_from(RoomRow)`, which checks the row invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub game_type: GameType,
    pub status: RoomStatus,
    pub player1_id: PlayerId,
    pub player2_id: Option<PlayerId>,
    pub current_turn: PlayerId,
    pub board: Board,
    pub winner_id: Option<PlayerId>,
    pub is_draw: bool,
    pub is_private: bool,
    pub rematch_requested_by: Option<PlayerId>,
    pub rematch_room_id: Option<RoomId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn is_participant(&self, player_id: &PlayerId) -> bool {
        &self.player1_id == player_id || self.player2_id.as_ref() == Some(player_id)
    }

    pub fn opponent_of(&self, player_id: &PlayerId) -> Option<&PlayerId> {
        if &self.player1_id == player_id {
            self.player2_id.as_ref()
        } else if self.player2_id.as_ref() == Some(player_id) {
            Some(&self.player1_id)
        } else {
            None
        }
    }

    /// Player 1 always plays X and moves first.
    pub fn mark_of(&self, player_id: &PlayerId) -> Option<Mark> {
        if &self.player1_id == player_id {
            Some(Mark::X)
        } else if self.player2_id.as_ref() == Some(player_id) {
            Some(Mark::O)
        } else {
            None
        }
    }

    pub fn player_with_mark(&self, mark: Mark) -> Option<&PlayerId> {
        match mark {
            Mark::X => Some(&self.player1_id),
            Mark::O => self.player2_id.as_ref(),
            Mark::Empty => None,
        }
    }

    pub fn is_turn_of(&self, player_id: &PlayerId) -> bool {
        self.status == RoomStatus::Playing && &self.current_turn == player_id
    }

    pub fn move_count(&self) -> usize {
        self.board.count_moves()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub display_name: String,
}

impl PlayerProfile {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// A room joined with the display info of its players.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomView {
    pub room: Room,
    pub player1: Option<PlayerProfile>,
    pub player2: Option<PlayerProfile>,
}

impl RoomView {
    pub fn display_name_of(&self, player_id: &PlayerId) -> Option<&str> {
        [&self.player1, &self.player2]
            .into_iter()
            .flatten()
            .find(|profile| &profile.id == player_id)
            .map(|profile| profile.display_name.as_str())
    }
}
