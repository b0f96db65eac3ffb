use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicTacToeError {
    #[error("Invalid move at cell {index}")]
    InvalidMove { index: usize },

    #[error("No available moves")]
    NoAvailableMoves,

    #[error("Search needs X or O to play, got an empty mark")]
    InvalidMark,
}
