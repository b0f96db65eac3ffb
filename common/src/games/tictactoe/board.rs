use std::fmt;

use super::error::TicTacToeError;
use super::types::{Mark, WinResult};
use super::win_detector::check_winner;

pub const CELL_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board {
    cells: [Mark; CELL_COUNT],
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [Mark::Empty; CELL_COUNT],
        }
    }

    pub fn from_cells(cells: [Mark; CELL_COUNT]) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Mark; CELL_COUNT] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied()
    }

    pub fn is_valid_move(&self, index: usize) -> bool {
        self.cell(index) == Some(Mark::Empty)
    }

    /// Returns a copy of the board with `mark` placed at `index`.
    pub fn make_move(&self, index: usize, mark: Mark) -> Result<Board, TicTacToeError> {
        if mark == Mark::Empty || !self.is_valid_move(index) {
            return Err(TicTacToeError::InvalidMove { index });
        }
        let mut cells = self.cells;
        cells[index] = mark;
        Ok(Board { cells })
    }

    /// Places `mark` without validation. Callers pass indices taken from
    /// `get_available_moves`.
    pub(crate) fn place(&self, index: usize, mark: Mark) -> Board {
        let mut cells = self.cells;
        cells[index] = mark;
        Board { cells }
    }

    pub fn count_moves(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    pub fn count_of(&self, mark: Mark) -> usize {
        self.cells.iter().filter(|&&cell| cell == mark).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count_moves() == 0
    }

    pub fn is_full(&self) -> bool {
        self.count_moves() == CELL_COUNT
    }

    /// X moves first, so X is never behind O and never more than one ahead.
    pub fn is_consistent(&self) -> bool {
        let x = self.count_of(Mark::X);
        let o = self.count_of(Mark::O);
        x == o || x == o + 1
    }

    pub fn next_mark(&self) -> Mark {
        if self.count_of(Mark::X) > self.count_of(Mark::O) {
            Mark::O
        } else {
            Mark::X
        }
    }

    pub fn winner(&self) -> Option<WinResult> {
        check_winner(self)
    }

    pub fn is_draw(&self) -> bool {
        self.is_full() && self.winner().is_none()
    }

    pub fn is_game_over(&self) -> bool {
        self.winner().is_some() || self.is_full()
    }
}

pub fn get_available_moves(board: &Board) -> Vec<usize> {
    board
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.is_empty())
        .map(|(index, _)| index)
        .collect()
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.cells.chunks(3).enumerate() {
            if row > 0 {
                writeln!(f)?;
            }
            write!(f, "{} {} {}", chunk[0], chunk[1], chunk[2])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(indices: &[usize]) -> Board {
        let mut board = Board::new();
        let mut mark = Mark::X;
        for &index in indices {
            board = board.make_move(index, mark).unwrap();
            mark = mark.opponent().unwrap();
        }
        board
    }

    #[test]
    fn test_initial_board_is_empty() {
        let board = Board::new();

        assert_eq!(board.count_moves(), 0);
        assert_eq!(get_available_moves(&board), (0..9).collect::<Vec<_>>());
        assert!(!board.is_game_over());
    }

    #[test]
    fn test_make_move_leaves_original_untouched() {
        let before = play(&[4, 0]);
        let snapshot = before;

        let after = before.make_move(8, Mark::X).unwrap();

        assert_eq!(before, snapshot);
        assert_eq!(after.cell(8), Some(Mark::X));
        assert_eq!(before.cell(8), Some(Mark::Empty));
    }

    #[test]
    fn test_make_move_rejects_occupied_cell() {
        let board = play(&[4]);

        assert_eq!(
            board.make_move(4, Mark::O),
            Err(TicTacToeError::InvalidMove { index: 4 })
        );
    }

    #[test]
    fn test_make_move_rejects_out_of_range() {
        assert_eq!(
            Board::new().make_move(9, Mark::X),
            Err(TicTacToeError::InvalidMove { index: 9 })
        );
        assert!(!Board::new().is_valid_move(9));
    }

    #[test]
    fn test_make_move_rejects_empty_mark() {
        assert!(Board::new().make_move(0, Mark::Empty).is_err());
    }

    #[test]
    fn test_available_moves_are_ascending() {
        let board = play(&[8, 0, 4]);

        assert_eq!(get_available_moves(&board), vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn test_full_board_without_winner_is_draw() {
        // X O X
        // X O O
        // O X X
        let board = play(&[0, 1, 2, 4, 3, 5, 7, 6, 8]);

        assert!(board.is_full());
        assert!(board.winner().is_none());
        assert!(board.is_draw());
        assert!(board.is_game_over());
    }

    #[test]
    fn test_board_with_empty_cell_is_never_draw() {
        let board = play(&[0, 1, 2, 4, 3, 5, 7, 6]);

        assert!(!board.is_draw());
    }

    #[test]
    fn test_full_winning_board_is_not_draw() {
        // X X X
        // O O X
        // O X O
        #[rustfmt::skip]
        let board = Board::from_cells([
            Mark::X, Mark::X, Mark::X,
            Mark::O, Mark::O, Mark::X,
            Mark::O, Mark::X, Mark::O,
        ]);

        assert!(board.is_full());
        assert!(!board.is_draw());
        assert!(board.is_game_over());
    }

    #[test]
    fn test_game_over_exactly_at_winning_move() {
        let sequence = [0, 4, 1, 3, 2];
        let mut board = Board::new();
        let mut mark = Mark::X;

        for (played, &index) in sequence.iter().enumerate() {
            assert!(!board.is_game_over(), "game over before move {}", played + 1);
            board = board.make_move(index, mark).unwrap();
            mark = mark.opponent().unwrap();
        }

        assert!(board.is_game_over());
        assert_eq!(board.winner(), Some(WinResult::new(Mark::X, [0, 1, 2])));
    }

    #[test]
    fn test_consistency_and_next_mark() {
        assert!(Board::new().is_consistent());
        assert_eq!(Board::new().next_mark(), Mark::X);

        let board = play(&[4]);
        assert!(board.is_consistent());
        assert_eq!(board.next_mark(), Mark::O);

        let lopsided = Board::new().make_move(0, Mark::O).unwrap();
        assert!(!lopsided.is_consistent());
    }

    #[test]
    fn test_display_renders_grid() {
        let board = play(&[0, 4]);

        assert_eq!(board.to_string(), "X - -\n- O -\n- - -");
    }
}
