use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::games::tictactoe::wire::{self, WireError};
use crate::{GameType, PlayerId, RoomId};
use super::types::{Room, RoomStatus};

/// A room as the store persists and pushes it. Loosely typed on purpose:
/// nothing here is trusted until it goes through `Room::try_from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRow {
    pub id: String,
    pub game_type: String,
    pub status: String,
    pub player1_id: String,
    pub player2_id: Option<String>,
    pub current_turn: String,
    pub board: Vec<String>,
    pub winner_id: Option<String>,
    pub is_draw: bool,
    pub is_private: bool,
    pub rematch_requested_by: Option<String>,
    pub rematch_room_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowDecodeError {
    #[error("Room {room_id}: {message}")]
    Field { room_id: String, message: String },

    #[error("Room {room_id}: bad board: {source}")]
    Board {
        room_id: String,
        #[source]
        source: WireError,
    },

    #[error("Room {room_id}: {message}")]
    Invariant { room_id: String, message: String },
}

impl RoomRow {
    fn field_error(&self, message: impl Into<String>) -> RowDecodeError {
        RowDecodeError::Field {
            room_id: self.id.clone(),
            message: message.into(),
        }
    }

    fn invariant_error(&self, message: impl Into<String>) -> RowDecodeError {
        RowDecodeError::Invariant {
            room_id: self.id.clone(),
            message: message.into(),
        }
    }

    fn non_empty_id(&self, name: &str, value: &str) -> Result<(), RowDecodeError> {
        if value.trim().is_empty() {
            return Err(self.field_error(format!("{} is empty", name)));
        }
        Ok(())
    }

    fn optional_player(&self, name: &str, value: &Option<String>) -> Result<Option<PlayerId>, RowDecodeError> {
        match value {
            Some(id) => {
                self.non_empty_id(name, id)?;
                Ok(Some(PlayerId::new(id.clone())))
            }
            None => Ok(None),
        }
    }

    fn timestamp(&self, name: &str, value: &str) -> Result<DateTime<Utc>, RowDecodeError> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| self.field_error(format!("{} {:?} is not RFC 3339: {}", name, value, e)))
    }
}

pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl TryFrom<RoomRow> for Room {
    type Error = RowDecodeError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        row.non_empty_id("id", &row.id)?;
        row.non_empty_id("game_type", &row.game_type)?;
        row.non_empty_id("player1_id", &row.player1_id)?;
        row.non_empty_id("current_turn", &row.current_turn)?;

        let status: RoomStatus = row.status.parse().map_err(|e: String| row.field_error(e))?;
        let board = wire::decode(&row.board).map_err(|source| RowDecodeError::Board {
            room_id: row.id.clone(),
            source,
        })?;
        let player1_id = PlayerId::new(row.player1_id.clone());
        let player2_id = row.optional_player("player2_id", &row.player2_id)?;
        let winner_id = row.optional_player("winner_id", &row.winner_id)?;
        let rematch_requested_by =
            row.optional_player("rematch_requested_by", &row.rematch_requested_by)?;
        let current_turn = PlayerId::new(row.current_turn.clone());
        let created_at = row.timestamp("created_at", &row.created_at)?;
        let updated_at = row.timestamp("updated_at", &row.updated_at)?;

        if player2_id.is_some() == (status == RoomStatus::Waiting) {
            return Err(row.invariant_error(format!(
                "player2 must be set exactly when status is not waiting (status {})",
                status
            )));
        }
        if player2_id.as_ref() == Some(&player1_id) {
            return Err(row.invariant_error("player1 and player2 are the same player"));
        }
        if status == RoomStatus::Playing
            && current_turn != player1_id
            && player2_id.as_ref() != Some(&current_turn)
        {
            return Err(row.invariant_error(format!(
                "current turn {} is not a participant",
                current_turn
            )));
        }
        if !board.is_consistent() {
            return Err(row.invariant_error("board mark counts are inconsistent"));
        }
        if let Some(winner) = &winner_id
            && winner != &player1_id
            && player2_id.as_ref() != Some(winner)
        {
            return Err(row.invariant_error(format!("winner {} is not a participant", winner)));
        }
        if winner_id.is_some() && row.is_draw {
            return Err(row.invariant_error("room has both a winner and a draw"));
        }
        if let Some(requester) = &rematch_requested_by
            && requester != &player1_id
            && player2_id.as_ref() != Some(requester)
        {
            return Err(row.invariant_error(format!(
                "rematch requester {} is not a participant",
                requester
            )));
        }

        Ok(Room {
            id: RoomId::new(row.id),
            game_type: GameType::new(row.game_type),
            status,
            player1_id,
            player2_id,
            current_turn,
            board,
            winner_id,
            is_draw: row.is_draw,
            is_private: row.is_private,
            rematch_requested_by,
            rematch_room_id: row.rematch_room_id.map(RoomId::new),
            created_at,
            updated_at,
        })
    }
}

impl From<&Room> for RoomRow {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.to_string(),
            game_type: room.game_type.to_string(),
            status: room.status.as_str().to_string(),
            player1_id: room.player1_id.to_string(),
            player2_id: room.player2_id.as_ref().map(PlayerId::to_string),
            current_turn: room.current_turn.to_string(),
            board: wire::encode(&room.board),
            winner_id: room.winner_id.as_ref().map(PlayerId::to_string),
            is_draw: room.is_draw,
            is_private: room.is_private,
            rematch_requested_by: room.rematch_requested_by.as_ref().map(PlayerId::to_string),
            rematch_room_id: room.rematch_room_id.as_ref().map(RoomId::to_string),
            created_at: format_timestamp(room.created_at),
            updated_at: format_timestamp(room.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::Mark;

    fn playing_row() -> RoomRow {
        RoomRow {
            id: "room_1".to_string(),
            game_type: "tictactoe".to_string(),
            status: "playing".to_string(),
            player1_id: "alice".to_string(),
            player2_id: Some("bob".to_string()),
            current_turn: "bob".to_string(),
            board: vec!["X", "", "", "", "", "", "", "", ""]
                .into_iter()
                .map(String::from)
                .collect(),
            winner_id: None,
            is_draw: false,
            is_private: false,
            rematch_requested_by: None,
            rematch_room_id: None,
            created_at: "2026-01-02T03:04:05.000Z".to_string(),
            updated_at: "2026-01-02T03:04:06.000Z".to_string(),
        }
    }

    #[test]
    fn test_valid_row_decodes() {
        let room = Room::try_from(playing_row()).unwrap();

        assert_eq!(room.status, RoomStatus::Playing);
        assert_eq!(room.board.cell(0), Some(Mark::X));
        assert_eq!(room.mark_of(&PlayerId::new("bob")), Some(Mark::O));
        assert_eq!(room.opponent_of(&PlayerId::new("bob")), Some(&PlayerId::new("alice")));
    }

    #[test]
    fn test_row_round_trips_through_room() {
        let row = playing_row();

        let room = Room::try_from(row.clone()).unwrap();

        assert_eq!(RoomRow::from(&room), row);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut row = playing_row();
        row.status = "paused".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Field { .. })));
    }

    #[test]
    fn test_short_board_is_rejected() {
        let mut row = playing_row();
        row.board.pop();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Board { .. })));
    }

    #[test]
    fn test_waiting_room_with_second_player_is_rejected() {
        let mut row = playing_row();
        row.status = "waiting".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Invariant { .. })));
    }

    #[test]
    fn test_playing_room_without_second_player_is_rejected() {
        let mut row = playing_row();
        row.player2_id = None;
        row.current_turn = "alice".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Invariant { .. })));
    }

    #[test]
    fn test_turn_of_outsider_is_rejected() {
        let mut row = playing_row();
        row.current_turn = "mallory".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Invariant { .. })));
    }

    #[test]
    fn test_inconsistent_board_is_rejected() {
        let mut row = playing_row();
        row.board[1] = "X".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Invariant { .. })));
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let mut row = playing_row();
        row.created_at = "yesterday".to_string();

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Field { .. })));
    }

    #[test]
    fn test_winner_and_draw_together_are_rejected() {
        let mut row = playing_row();
        row.status = "finished".to_string();
        row.winner_id = Some("alice".to_string());
        row.is_draw = true;

        assert!(matches!(Room::try_from(row), Err(RowDecodeError::Invariant { .. })));
    }

    #[test]
    fn test_row_deserializes_from_yaml() {
        let yaml = r#"
id: room_9
game_type: tictactoe
status: waiting
player1_id: alice
player2_id: null
current_turn: alice
board: ["", "", "", "", "", "", "", "", ""]
winner_id: null
is_draw: false
is_private: true
rematch_requested_by: null
rematch_room_id: null
created_at: "2026-01-02T03:04:05Z"
updated_at: "2026-01-02T03:04:05Z"
"#;
        let row: RoomRow = serde_yaml_ng::from_str(yaml).unwrap();

        let room = Room::try_from(row).unwrap();

        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.is_private);
        assert!(room.board.is_empty());
    }
}
