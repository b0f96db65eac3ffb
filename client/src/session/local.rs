use common::games::SessionRng;
use common::games::tictactoe::{Board, BotInput, Difficulty, Mark, calculate_move};
use common::{GameType, PlayerId, log};
use tokio::time::Instant;

use crate::config::AiConfig;
use crate::stats::{GameRecord, GameResult, OpponentKind, StatsRecorder, report_game};
use super::{GameOutcome, MoveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMode {
    /// Both marks are played on this device. Stats are kept for X.
    TwoPlayer,
    VersusAi { difficulty: Difficulty, ai_mark: Mark },
}

/// A game played entirely on this device, against a second local player or
/// the search engine. X always opens.
pub struct LocalGameSession<R: StatsRecorder> {
    player_id: PlayerId,
    mode: LocalMode,
    board: Board,
    to_move: Mark,
    outcome: Option<GameOutcome>,
    ai: AiConfig,
    rng: SessionRng,
    recorder: R,
    started_at: Instant,
}

impl<R: StatsRecorder> LocalGameSession<R> {
    pub fn new(player_id: PlayerId, mode: LocalMode, ai: AiConfig, recorder: R, rng: SessionRng) -> Self {
        Self {
            player_id,
            mode,
            board: Board::new(),
            to_move: Mark::X,
            outcome: None,
            ai,
            rng,
            recorder,
            started_at: Instant::now(),
        }
    }

    pub fn board(&self) -> Board {
        self.board
    }

    pub fn mode(&self) -> LocalMode {
        self.mode
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn to_move(&self) -> Option<Mark> {
        self.outcome.is_none().then_some(self.to_move)
    }

    pub fn is_ai_turn(&self) -> bool {
        match self.mode {
            LocalMode::VersusAi { ai_mark, .. } => self.outcome.is_none() && self.to_move == ai_mark,
            LocalMode::TwoPlayer => false,
        }
    }

    /// Human input. Ignored while the AI is to move or once the game is over.
    pub fn place_mark(&mut self, index: usize) -> MoveResult {
        if self.outcome.is_some() || self.is_ai_turn() {
            return MoveResult::Ignored;
        }
        self.apply(index, self.to_move)
    }

    pub async fn run_ai_turn(&mut self) -> MoveResult {
        let LocalMode::VersusAi { difficulty, ai_mark } = self.mode else {
            return MoveResult::Ignored;
        };
        if !self.is_ai_turn() {
            return MoveResult::Ignored;
        }

        tokio::time::sleep(self.ai.thinking_delay(difficulty)).await;
        match calculate_move(difficulty, &BotInput::new(self.board, ai_mark), &mut self.rng) {
            Ok(index) => self.apply(index, ai_mark),
            Err(e) => {
                log!("AI ({}) could not move: {}", difficulty, e);
                MoveResult::Ignored
            }
        }
    }

    /// Human move followed by the AI answer when playing against it.
    pub async fn play_turn(&mut self, index: usize) -> MoveResult {
        let result = self.place_mark(index);
        if result == MoveResult::Continue && self.is_ai_turn() {
            return self.run_ai_turn().await;
        }
        result
    }

    pub fn restart(&mut self) {
        self.board = Board::new();
        self.to_move = Mark::X;
        self.outcome = None;
        self.started_at = Instant::now();
    }

    fn apply(&mut self, index: usize, mark: Mark) -> MoveResult {
        let Ok(next) = self.board.make_move(index, mark) else {
            return MoveResult::Ignored;
        };
        self.board = next;

        if let Some(outcome) = GameOutcome::of(&self.board) {
            self.outcome = Some(outcome);
            self.report(outcome);
            return MoveResult::Finished(outcome);
        }
        if let Some(opponent) = mark.opponent() {
            self.to_move = opponent;
        }
        MoveResult::Continue
    }

    fn report(&self, outcome: GameOutcome) {
        let (mark, opponent) = match self.mode {
            LocalMode::TwoPlayer => (Mark::X, OpponentKind::Local),
            LocalMode::VersusAi { difficulty, ai_mark } => (
                ai_mark.opponent().unwrap_or(Mark::X),
                OpponentKind::Ai(difficulty),
            ),
        };
        let result = match outcome {
            GameOutcome::Won(line) if line.winner == mark => GameResult::Win,
            GameOutcome::Won(_) => GameResult::Loss,
            GameOutcome::Draw => GameResult::Draw,
        };

        report_game(
            &self.recorder,
            GameRecord {
                player_id: self.player_id.clone(),
                game_type: GameType::tictactoe(),
                opponent,
                result,
                mark,
                move_count: self.board.count_moves(),
                duration_seconds: self.started_at.elapsed().as_secs(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stats::MemoryStats;

    fn two_player(stats: &MemoryStats) -> LocalGameSession<MemoryStats> {
        LocalGameSession::new(
            PlayerId::new("alice"),
            LocalMode::TwoPlayer,
            AiConfig::instant(),
            stats.clone(),
            SessionRng::new(1),
        )
    }

    fn versus_ai(difficulty: Difficulty, ai_mark: Mark, ai: AiConfig) -> LocalGameSession<MemoryStats> {
        LocalGameSession::new(
            PlayerId::new("alice"),
            LocalMode::VersusAi { difficulty, ai_mark },
            ai,
            MemoryStats::new(),
            SessionRng::new(42),
        )
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_two_player_game_ends_on_fifth_move() {
        let stats = MemoryStats::new();
        let mut session = two_player(&stats);

        for index in [0, 4, 1, 3] {
            assert_eq!(session.place_mark(index), MoveResult::Continue);
        }
        let result = session.place_mark(2);

        let MoveResult::Finished(GameOutcome::Won(line)) = result else {
            panic!("expected a win, got {:?}", result);
        };
        assert_eq!(line.winner, Mark::X);
        assert_eq!(line.line, [0, 1, 2]);
        assert_eq!(session.board().count_moves(), 5);
        assert_eq!(session.to_move(), None);

        settle().await;
        let records = stats.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result, GameResult::Win);
        assert_eq!(records[0].opponent, OpponentKind::Local);
        assert_eq!(records[0].move_count, 5);
    }

    #[tokio::test]
    async fn test_taken_cell_and_finished_game_are_ignored() {
        let stats = MemoryStats::new();
        let mut session = two_player(&stats);
        session.place_mark(4);

        assert_eq!(session.place_mark(4), MoveResult::Ignored);
        assert_eq!(session.place_mark(9), MoveResult::Ignored);
        assert_eq!(session.to_move(), Some(Mark::O));

        for index in [0, 1, 8, 7] {
            session.place_mark(index);
        }
        assert!(session.outcome().is_some());
        assert_eq!(session.place_mark(2), MoveResult::Ignored);
    }

    #[tokio::test]
    async fn test_draw_is_reported_once() {
        let stats = MemoryStats::new();
        let mut session = two_player(&stats);

        let mut last = MoveResult::Ignored;
        for index in [0, 1, 2, 4, 3, 5, 7, 6, 8] {
            last = session.place_mark(index);
        }

        assert_eq!(last, MoveResult::Finished(GameOutcome::Draw));
        settle().await;
        assert_eq!(stats.records().await.len(), 1);
        assert_eq!(stats.records().await[0].result, GameResult::Draw);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_during_ai_turn_is_ignored() {
        let mut session = versus_ai(Difficulty::Impossible, Mark::X, AiConfig::default());

        assert!(session.is_ai_turn());
        assert_eq!(session.place_mark(4), MoveResult::Ignored);
        assert!(session.board().is_empty());

        let started = Instant::now();
        assert_eq!(session.run_ai_turn().await, MoveResult::Continue);
        assert!(started.elapsed() >= Duration::from_millis(1_000));
        assert_eq!(session.board().count_moves(), 1);
        assert!(!session.is_ai_turn());
        assert_eq!(session.run_ai_turn().await, MoveResult::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_turn_gets_ai_answer() {
        let mut session = versus_ai(Difficulty::Impossible, Mark::O, AiConfig::default());

        assert_eq!(session.play_turn(0).await, MoveResult::Continue);

        assert_eq!(session.board().count_moves(), 2);
        assert_eq!(session.to_move(), Some(Mark::X));
    }

    #[tokio::test]
    async fn test_impossible_ai_blocks_and_never_loses() {
        let mut session = versus_ai(Difficulty::Impossible, Mark::O, AiConfig::instant());

        session.play_turn(0).await;
        session.play_turn(1).await;

        // X threatens 0-1-2; the engine has to take 2.
        assert_eq!(session.board().cell(2), Some(Mark::O));

        let mut rng = SessionRng::new(5);
        while session.outcome().is_none() {
            let free = common::games::tictactoe::get_available_moves(&session.board());
            let index = rng.choose(&free).unwrap();
            session.play_turn(index).await;
        }
        assert!(!matches!(
            session.outcome(),
            Some(GameOutcome::Won(line)) if line.winner == Mark::X
        ));
    }

    #[tokio::test]
    async fn test_loss_against_ai_is_recorded_for_the_human() {
        let stats = MemoryStats::new();
        let mut session = LocalGameSession::new(
            PlayerId::new("alice"),
            LocalMode::VersusAi {
                difficulty: Difficulty::Impossible,
                ai_mark: Mark::X,
            },
            AiConfig::instant(),
            stats.clone(),
            SessionRng::new(8),
        );

        // The human (O) plays only the edge cells, which loses to perfect play.
        session.run_ai_turn().await;
        for index in [1, 3, 5, 7] {
            session.play_turn(index).await;
        }
        while session.outcome().is_none() {
            let free = common::games::tictactoe::get_available_moves(&session.board());
            session.play_turn(free[0]).await;
        }

        settle().await;
        let records = stats.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mark, Mark::O);
        assert_eq!(records[0].opponent, OpponentKind::Ai(Difficulty::Impossible));
        assert_ne!(records[0].result, GameResult::Win);
    }

    #[tokio::test]
    async fn test_restart_clears_board() {
        let stats = MemoryStats::new();
        let mut session = two_player(&stats);
        for index in [0, 4, 1, 3, 2] {
            session.place_mark(index);
        }

        session.restart();

        assert!(session.board().is_empty());
        assert_eq!(session.outcome(), None);
        assert_eq!(session.to_move(), Some(Mark::X));
        assert_eq!(session.place_mark(4), MoveResult::Continue);
    }
}
