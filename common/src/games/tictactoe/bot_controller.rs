use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::games::SessionRng;
use super::board::{Board, get_available_moves};
use super::error::TicTacToeError;
use super::types::Mark;

/// Center first, then the corners.
pub const GOOD_OPENING_CELLS: [usize; 5] = [4, 0, 2, 6, 8];

pub const HARD_MAX_DEPTH: usize = 3;

const WIN_SCORE: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Impossible,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Impossible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Impossible => "impossible",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Difficulty::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown difficulty: {}", s))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BotInput {
    pub board: Board,
    pub mark: Mark,
}

impl BotInput {
    pub fn new(board: Board, mark: Mark) -> Self {
        Self { board, mark }
    }
}

pub fn calculate_move(
    difficulty: Difficulty,
    input: &BotInput,
    rng: &mut SessionRng,
) -> Result<usize, TicTacToeError> {
    if input.board.is_full() {
        return Err(TicTacToeError::NoAvailableMoves);
    }

    if input.board.is_empty() {
        return rng
            .choose(&GOOD_OPENING_CELLS)
            .ok_or(TicTacToeError::NoAvailableMoves);
    }

    match difficulty {
        Difficulty::Easy => best_or_random(&input.board, input.mark, 0.3, rng),
        Difficulty::Medium => best_or_random(&input.board, input.mark, 0.7, rng),
        Difficulty::Hard => get_best_move_limited(&input.board, input.mark, HARD_MAX_DEPTH),
        Difficulty::Impossible => get_best_move(&input.board, input.mark),
    }
}

fn best_or_random(
    board: &Board,
    mark: Mark,
    best_probability: f64,
    rng: &mut SessionRng,
) -> Result<usize, TicTacToeError> {
    if rng.chance(best_probability) {
        get_best_move(board, mark)
    } else {
        get_random_move(board, rng)
    }
}

pub fn get_random_move(board: &Board, rng: &mut SessionRng) -> Result<usize, TicTacToeError> {
    rng.choose(&get_available_moves(board))
        .ok_or(TicTacToeError::NoAvailableMoves)
}

pub fn get_best_move(board: &Board, mark: Mark) -> Result<usize, TicTacToeError> {
    search(board, mark, None)
}

/// Same search, but any position at `max_depth` that is not already decided
/// scores 0.
pub fn get_best_move_limited(
    board: &Board,
    mark: Mark,
    max_depth: usize,
) -> Result<usize, TicTacToeError> {
    search(board, mark, Some(max_depth))
}

struct SearchContext {
    bot_mark: Mark,
    opponent_mark: Mark,
    max_depth: Option<usize>,
}

fn search(board: &Board, mark: Mark, max_depth: Option<usize>) -> Result<usize, TicTacToeError> {
    let opponent_mark = mark.opponent().ok_or(TicTacToeError::InvalidMark)?;
    let ctx = SearchContext {
        bot_mark: mark,
        opponent_mark,
        max_depth,
    };

    let mut best_move = None;
    let mut best_score = i32::MIN;
    let mut alpha = i32::MIN;

    for index in get_available_moves(board) {
        let next = board.place(index, mark);
        let score = minimax(&ctx, &next, 1, false, alpha, i32::MAX);

        // Strict comparison keeps the lowest index among equal scores.
        if best_move.is_none() || score > best_score {
            best_score = score;
            best_move = Some(index);
        }
        alpha = alpha.max(score);
    }

    best_move.ok_or(TicTacToeError::NoAvailableMoves)
}

fn minimax(
    ctx: &SearchContext,
    board: &Board,
    depth: usize,
    is_maximizing: bool,
    mut alpha: i32,
    mut beta: i32,
) -> i32 {
    if let Some(result) = board.winner() {
        return if result.winner == ctx.bot_mark {
            WIN_SCORE - depth as i32
        } else {
            depth as i32 - WIN_SCORE
        };
    }

    if board.is_full() {
        return 0;
    }

    if ctx.max_depth.is_some_and(|max| depth >= max) {
        return 0;
    }

    if is_maximizing {
        let mut max_eval = i32::MIN;
        for index in get_available_moves(board) {
            let next = board.place(index, ctx.bot_mark);
            let eval = minimax(ctx, &next, depth + 1, false, alpha, beta);
            max_eval = max_eval.max(eval);
            alpha = alpha.max(eval);
            if beta <= alpha {
                break;
            }
        }
        max_eval
    } else {
        let mut min_eval = i32::MAX;
        for index in get_available_moves(board) {
            let next = board.place(index, ctx.opponent_mark);
            let eval = minimax(ctx, &next, depth + 1, true, alpha, beta);
            min_eval = min_eval.min(eval);
            beta = beta.min(eval);
            if beta <= alpha {
                break;
            }
        }
        min_eval
    }
}
