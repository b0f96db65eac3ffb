mod board;
mod bot_controller;
mod error;
mod types;
mod win_detector;

pub mod wire;

pub use board::{Board, CELL_COUNT, get_available_moves};
pub use bot_controller::{
    BotInput, Difficulty, GOOD_OPENING_CELLS, HARD_MAX_DEPTH, calculate_move, get_best_move,
    get_best_move_limited, get_random_move,
};
pub use error::TicTacToeError;
pub use types::{Mark, WinResult};
pub use win_detector::{WINNING_LINES, check_winner};
pub use wire::WireError;
