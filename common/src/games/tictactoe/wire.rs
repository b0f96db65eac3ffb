//! Persisted form of a board: nine strings, `""` for an empty cell and
//! `"X"` / `"O"` for occupied ones.

use thiserror::Error;

use super::board::{Board, CELL_COUNT};
use super::types::Mark;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Board must have {CELL_COUNT} cells, got {0}")]
    WrongLength(usize),

    #[error("Unknown cell value {value:?} at index {index}")]
    UnknownCell { index: usize, value: String },
}

pub fn encode(board: &Board) -> Vec<String> {
    board
        .cells()
        .iter()
        .map(|mark| mark.as_str().to_string())
        .collect()
}

pub fn decode<S: AsRef<str>>(cells: &[S]) -> Result<Board, WireError> {
    if cells.len() != CELL_COUNT {
        return Err(WireError::WrongLength(cells.len()));
    }
    let mut marks = [Mark::Empty; CELL_COUNT];
    for (index, value) in cells.iter().enumerate() {
        marks[index] = match value.as_ref() {
            "" => Mark::Empty,
            "X" => Mark::X,
            "O" => Mark::O,
            other => {
                return Err(WireError::UnknownCell {
                    index,
                    value: other.to_string(),
                });
            }
        };
    }
    Ok(Board::from_cells(marks))
}
