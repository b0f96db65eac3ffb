use super::board::Board;
use super::types::{Mark, WinResult};

/// Rows top-to-bottom, columns left-to-right, main diagonal, anti-diagonal.
/// The order decides which line is reported first.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

pub fn check_winner(board: &Board) -> Option<WinResult> {
    let cells = board.cells();
    WINNING_LINES.iter().find_map(|&line| {
        let [a, b, c] = line;
        let mark = cells[a];
        if mark != Mark::Empty && cells[b] == mark && cells[c] == mark {
            Some(WinResult::new(mark, line))
        } else {
            None
        }
    })
}
