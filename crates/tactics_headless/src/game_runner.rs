//! Full battle runner for headless testing.
//!
//! Plays a scenario from start to finish with the auto player standing in
//! for the human, collecting metrics and optional ASCII frames.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tactics_core::battle::{Outcome, StepResult};

use crate::ascii_visualizer::{render_ascii, AsciiConfig};
use crate::metrics::{GameMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};
use crate::strategies::AutoPlayer;

// =============================================================================
// WATCHDOG LIMITS (detecting hangs, not battle length)
// =============================================================================

/// Simulation steps allowed between two player phases.
/// A round that needs more than this is stuck in a loop.
pub const MAX_STEPS_PER_ROUND: u32 = 100_000;

/// Wall-clock time after which a round is logged as slow (ms).
const SLOW_ROUND_THRESHOLD_MS: u128 = 100;

/// Configuration for a single game run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Random seed for determinism.
    pub seed: u64,
    /// Rounds before the game counts as unfinished. 0 uses the scenario's.
    pub max_rounds: u32,
    /// Game identifier used in metrics.
    pub game_id: String,
    /// Player policy.
    pub player: AutoPlayer,
    /// Capture an ASCII frame at the start of every player phase.
    pub render_ascii: bool,
    /// Frame options.
    pub ascii: AsciiConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_rounds: 0,
            game_id: String::from("game_0"),
            player: AutoPlayer::default(),
            render_ascii: false,
            ascii: AsciiConfig {
                show_legend: false,
                use_color: false,
            },
        }
    }
}

impl GameConfig {
    /// Config for one seed, with a matching game id.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            game_id: format!("game_{seed}"),
            ..Default::default()
        }
    }
}

/// Result of running a game.
#[derive(Debug, Clone)]
pub struct GameResult {
    /// Collected metrics.
    pub metrics: GameMetrics,
    /// Final outcome; `Ongoing` if the round limit was hit.
    pub outcome: Outcome,
    /// Rounds started.
    pub rounds: u32,
    /// Final simulation state hash.
    pub final_state_hash: u64,
    /// ASCII frames, one per player phase, if requested.
    pub frames: Vec<String>,
}

/// Play `scenario` to completion or the round limit.
pub fn run_game(scenario: &Scenario, config: &GameConfig) -> Result<GameResult, ScenarioError> {
    let mut battle = scenario.build_battle(config.seed)?;
    let collector = Rc::new(RefCell::new(MetricsCollector::for_battle(
        &config.game_id,
        scenario,
        config.seed,
        &battle,
    )));
    battle.add_observer(Box::new(Rc::clone(&collector)));

    let max_rounds = if config.max_rounds == 0 {
        scenario.max_rounds
    } else {
        config.max_rounds
    };
    info!(game = %config.game_id, seed = config.seed, max_rounds, "game starting");

    battle.start()?;
    let mut frames = Vec::new();
    loop {
        let round_start = Instant::now();
        let result = battle.run_until_player_phase(MAX_STEPS_PER_ROUND)?;
        let elapsed = round_start.elapsed().as_millis();
        if elapsed > SLOW_ROUND_THRESHOLD_MS {
            warn!(round = battle.round(), elapsed_ms = elapsed, "slow round");
        }
        if let StepResult::BattleOver(outcome) = result {
            debug!(%outcome, "battle decided");
            break;
        }

        if config.render_ascii {
            frames.push(render_ascii(battle.world(), battle.round(), &config.ascii));
        }
        if battle.round() > max_rounds {
            debug!(round = battle.round(), "round limit reached");
            break;
        }

        config.player.play_turn(&mut battle)?;
        if battle.outcome() != Outcome::Ongoing {
            break;
        }
        battle.end_player_turn()?;
    }

    let mut collector = collector.borrow_mut();
    collector.finalize(&battle);
    let metrics = collector.metrics().clone();
    let outcome = battle.outcome();
    info!(
        game = %config.game_id,
        %outcome,
        rounds = battle.round(),
        hash = format!("{:016x}", battle.state_hash()),
        "game finished"
    );

    Ok(GameResult {
        outcome,
        rounds: battle.round(),
        final_state_hash: battle.state_hash(),
        frames,
        metrics,
    })
}
