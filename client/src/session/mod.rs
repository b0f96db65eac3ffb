mod local;
mod online;

use common::games::tictactoe::{Board, Mark, WinResult};
use common::store::RoomStore;

use crate::room_sync::SyncError;
use crate::stats::StatsRecorder;

pub use local::{LocalGameSession, LocalMode};
pub use online::{OnlineGameSession, OnlinePhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Won(WinResult),
    Draw,
}

impl GameOutcome {
    pub fn of(board: &Board) -> Option<Self> {
        if let Some(result) = board.winner() {
            return Some(GameOutcome::Won(result));
        }
        board.is_draw().then_some(GameOutcome::Draw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveResult {
    /// Not this side's turn, game over or cell taken. Nothing changed.
    Ignored,
    /// The server had moved on; the board was resynced instead.
    Conflict,
    Continue,
    Finished(GameOutcome),
}

/// One turn-taking surface over both kinds of game.
pub enum GameSessionController<S: RoomStore, R: StatsRecorder> {
    Local(LocalGameSession<R>),
    Online(OnlineGameSession<S, R>),
}

impl<S: RoomStore, R: StatsRecorder> GameSessionController<S, R> {
    pub fn board(&self) -> Board {
        match self {
            GameSessionController::Local(session) => session.board(),
            GameSessionController::Online(session) => session.board(),
        }
    }

    /// Mark that is expected to move next, if the game is still running.
    pub fn to_move(&self) -> Option<Mark> {
        match self {
            GameSessionController::Local(session) => session.to_move(),
            GameSessionController::Online(session) => session.to_move(),
        }
    }

    pub fn is_over(&self) -> bool {
        match self {
            GameSessionController::Local(session) => session.outcome().is_some(),
            GameSessionController::Online(session) => session.phase() == OnlinePhase::Finished,
        }
    }

    /// Local games answer with the AI move in the same call.
    pub async fn place_mark(&mut self, index: usize) -> Result<MoveResult, SyncError> {
        match self {
            GameSessionController::Local(session) => Ok(session.play_turn(index).await),
            GameSessionController::Online(session) => session.place_mark(index).await,
        }
    }
}
