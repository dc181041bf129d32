//! Batch game runner for balance testing.
//!
//! Runs many seeds of one scenario, in parallel using rayon, and
//! aggregates their metrics.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::game_runner::{run_game, GameConfig};
use crate::metrics::{BatchSummary, GameMetrics};
use crate::scenario::Scenario;
use crate::strategies::AutoPlayer;

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario name, for the record
    pub scenario: String,
    /// Number of games to run
    pub game_count: u32,
    /// Run games on the rayon pool
    pub parallel: bool,
    /// Maximum parallel games (0 = use rayon default)
    pub parallel_games: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Starting seed for deterministic runs
    pub seed_start: u64,
    /// Round limit per game (0 = scenario default)
    pub max_rounds: u32,
    /// Player policy
    pub player: AutoPlayer,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            game_count: 100,
            parallel: true,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
            max_rounds: 0,
            player: AutoPlayer::default(),
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Run sequentially or in parallel
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the round limit
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual game metrics, in seed order
    pub games: Vec<GameMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index
    pub game_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Progress tracking for batch runs
#[derive(Debug)]
pub struct BatchProgress {
    /// Total games
    pub total: u32,
    /// Completed games
    completed: AtomicU32,
    /// Victories so far
    victories: AtomicU32,
    /// Start time
    pub start_time: Instant,
}

impl BatchProgress {
    /// Create new progress tracker
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            victories: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed game. Returns the completion count.
    pub fn record_completion(&self, victory: bool) -> u32 {
        if victory {
            self.victories.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get current completion count
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Victory rate over completed games
    pub fn victory_rate(&self) -> f64 {
        let completed = self.current();
        if completed == 0 {
            return 0.0;
        }
        f64::from(self.victories.load(Ordering::Relaxed)) / f64::from(completed)
    }

    /// Get estimated time remaining
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }

        let elapsed = self.start_time.elapsed();
        let per_game = elapsed.as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_game * f64::from(remaining))
    }
}

/// Run one seed of the batch.
fn run_single_game(
    scenario: &Scenario,
    index: u32,
    config: &BatchConfig,
    progress: &BatchProgress,
) -> Result<GameMetrics, BatchError> {
    let seed = config.seed_start.wrapping_add(u64::from(index));
    let game_config = GameConfig {
        max_rounds: config.max_rounds,
        player: config.player,
        ..GameConfig::with_seed(seed)
    };

    match run_game(scenario, &game_config) {
        Ok(result) => {
            let completed = progress.record_completion(result.metrics.is_victory());
            if completed % 10 == 0 {
                debug!(
                    completed,
                    total = progress.total,
                    victory_rate = progress.victory_rate(),
                    eta_secs = progress.eta().as_secs(),
                    "batch progress"
                );
            }
            Ok(result.metrics)
        }
        Err(err) => {
            warn!(game = index, seed, error = %err, "game failed");
            Err(BatchError {
                game_index: index,
                seed,
                message: err.to_string(),
            })
        }
    }
}

/// Run a batch of games
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let progress = BatchProgress::new(config.game_count);

    info!(
        games = config.game_count,
        scenario = %config.scenario,
        parallel = config.parallel,
        "starting batch run"
    );

    let run_all = || -> Vec<Result<GameMetrics, BatchError>> {
        if config.parallel {
            (0..config.game_count)
                .into_par_iter()
                .map(|i| run_single_game(scenario, i, &config, &progress))
                .collect()
        } else {
            (0..config.game_count)
                .map(|i| run_single_game(scenario, i, &config, &progress))
                .collect()
        }
    };

    let results = if config.parallel && config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(err) => {
                warn!(error = %err, "thread pool unavailable, using global pool");
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<GameMetrics> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        games = games.len(),
        errors = errors.len(),
        victory_rate = summary.victory_rate,
        "batch complete in {duration_seconds:.1}s"
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed multiple times
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let config = GameConfig::with_seed(seed);
    let mut first: Option<GameMetrics> = None;
    for run in 0..runs {
        let metrics = match run_game(scenario, &config) {
            Ok(result) => result.metrics,
            Err(err) => {
                warn!(run, seed, error = %err, "determinism run failed");
                return false;
            }
        };
        match &first {
            None => first = Some(metrics),
            Some(expected) if *expected == metrics => {}
            Some(expected) => {
                warn!(
                    run,
                    seed,
                    expected = format!("{:016x}", expected.final_state_hash),
                    actual = format!("{:016x}", metrics.final_state_hash),
                    "determinism violation"
                );
                return false;
            }
        }
    }
    true
}
