use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::games::tictactoe::{Difficulty, Mark};
use common::{GameType, PlayerId, log};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::StatsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameResult::Win => "win",
            GameResult::Loss => "loss",
            GameResult::Draw => "draw",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentKind {
    Local,
    Ai(Difficulty),
    Online,
}

/// One finished game from the point of view of `player_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub player_id: PlayerId,
    pub game_type: GameType,
    pub opponent: OpponentKind,
    pub result: GameResult,
    pub mark: Mark,
    pub move_count: usize,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub wins: u32,
    pub games: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("Stats service unavailable: {0}")]
    Unavailable(String),

    #[error("Stats request timed out after {0:?}")]
    TimedOut(Duration),
}

pub trait StatsRecorder: Send + Sync + Clone + 'static {
    fn record_game(&self, record: GameRecord) -> impl Future<Output = Result<(), StatsError>> + Send;

    fn top_players(
        &self,
        game_type: &GameType,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, StatsError>> + Send;
}

/// Hands the record to the recorder without waiting for it. Failures are
/// only logged.
pub fn report_game<R: StatsRecorder>(recorder: &R, record: GameRecord) {
    let recorder = recorder.clone();
    tokio::spawn(async move {
        let summary = format!("{} {} in {} moves", record.player_id, record.result, record.move_count);
        match recorder.record_game(record).await {
            Ok(()) => log!("Recorded game: {}", summary),
            Err(e) => log!("Failed to record game ({}): {}", summary, e),
        }
    });
}

/// Keeps records in memory and ranks by wins. Serves offline play and tests.
#[derive(Clone, Default)]
pub struct MemoryStats {
    records: Arc<Mutex<Vec<GameRecord>>>,
    latency: Duration,
    unavailable: bool,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub async fn records(&self) -> Vec<GameRecord> {
        self.records.lock().await.clone()
    }

    async fn answer(&self) -> Result<(), StatsError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable {
            return Err(StatsError::Unavailable("stats service is down".to_string()));
        }
        Ok(())
    }
}

impl StatsRecorder for MemoryStats {
    async fn record_game(&self, record: GameRecord) -> Result<(), StatsError> {
        self.answer().await?;
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn top_players(&self, game_type: &GameType, limit: usize) -> Result<Vec<LeaderboardEntry>, StatsError> {
        self.answer().await?;
        let records = self.records.lock().await;

        let mut by_player: HashMap<&PlayerId, LeaderboardEntry> = HashMap::new();
        for record in records.iter().filter(|r| &r.game_type == game_type) {
            let entry = by_player.entry(&record.player_id).or_insert_with(|| LeaderboardEntry {
                player_id: record.player_id.clone(),
                wins: 0,
                games: 0,
            });
            entry.games += 1;
            if record.result == GameResult::Win {
                entry.wins += 1;
            }
        }

        let mut entries: Vec<LeaderboardEntry> = by_player.into_values().collect();
        entries.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.player_id.cmp(&b.player_id)));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderboardResult {
    Loaded(Vec<LeaderboardEntry>),
    /// A newer load was started while this one was in flight.
    Stale,
    Failed(StatsError),
}

/// Loads the top-N list with a timeout. Only the most recent request may
/// deliver a result.
#[derive(Clone)]
pub struct LeaderboardLoader<R: StatsRecorder> {
    recorder: R,
    timeout: Duration,
    limit: usize,
    latest_token: Arc<AtomicU64>,
}

impl<R: StatsRecorder> LeaderboardLoader<R> {
    pub fn new(recorder: R, config: &StatsConfig) -> Self {
        Self {
            recorder,
            timeout: config.leaderboard_timeout(),
            limit: config.leaderboard_limit,
            latest_token: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn load(&self, game_type: &GameType) -> LeaderboardResult {
        let token = self.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
        let response = tokio::time::timeout(self.timeout, self.recorder.top_players(game_type, self.limit)).await;

        if self.latest_token.load(Ordering::SeqCst) != token {
            log!("Dropping leaderboard response {} for {}, a newer request exists", token, game_type);
            return LeaderboardResult::Stale;
        }
        match response {
            Ok(Ok(entries)) => LeaderboardResult::Loaded(entries),
            Ok(Err(e)) => {
                log!("Leaderboard for {} failed: {}", game_type, e);
                LeaderboardResult::Failed(e)
            }
            Err(_) => {
                log!("Leaderboard for {} timed out", game_type);
                LeaderboardResult::Failed(StatsError::TimedOut(self.timeout))
            }
        }
    }
}
