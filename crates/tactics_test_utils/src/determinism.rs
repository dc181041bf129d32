//! Determinism testing utilities.
//!
//! Provides a harness for verifying that battles produce identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! A seed and a sequence of player actions must fully determine a battle.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: world positions use [`tactics_core::math::Fixed`].
//!
//! - **HashMap iteration order**: units and hazards live in `BTreeMap`s and
//!   are always visited in id order.
//!
//! - **System randomness**: behaviors draw from the battle's seeded
//!   [`tactics_core::rng::DeterministicRng`].
//!
//! - **Pathfinding tie-breaks**: A* resolves equal costs by a fixed rule, so
//!   the same bake always yields the same path.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tactics_core::battle::{Battle, StepResult};

/// Step bound used when driving a battle to the next player phase.
pub const MAX_STEPS_PER_PHASE: u32 = 100_000;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps (or rounds) simulated.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that all runs matched.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `steps` - Number of steps to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one step
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Play one full round with a passive player: finish the current enemy
/// phase if any, then end the player's turn.
///
/// Returns false once the battle is over.
///
/// # Panics
///
/// Panics if the battle errors or stalls.
pub fn play_passive_round(battle: &mut Battle) -> bool {
    match battle.run_until_player_phase(MAX_STEPS_PER_PHASE) {
        Ok(StepResult::BattleOver(_)) => false,
        Ok(_) => battle
            .end_player_turn()
            .unwrap_or_else(|err| panic!("end_player_turn failed: {err}")),
        Err(err) => panic!("battle failed: {err}"),
    }
}

/// Start a battle and play `rounds` passive rounds in each of `runs` fresh
/// copies, comparing the final state hashes.
///
/// # Panics
///
/// Panics if a battle fails to start.
pub fn verify_battle_determinism<F>(setup_fn: F, runs: usize, rounds: u64) -> DeterminismResult
where
    F: Fn() -> Battle,
{
    verify_determinism(
        runs,
        rounds,
        || {
            let mut battle = setup_fn();
            battle
                .start()
                .unwrap_or_else(|err| panic!("battle failed to start: {err}"));
            battle
        },
        |battle| {
            play_passive_round(battle);
        },
        Battle::state_hash,
    )
}

/// Compare two battles step by step, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when two runs
/// start to differ. The player passes whenever it is their turn.
///
/// # Returns
///
/// `None` if the battles stayed identical, `Some(step)` otherwise.
pub fn find_first_divergence<F>(setup_fn: F, num_steps: u64) -> Option<u64>
where
    F: Fn() -> Battle,
{
    let mut first = setup_fn();
    let mut second = setup_fn();
    if first.start().is_err() || second.start().is_err() {
        return Some(0);
    }
    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for step in 1..=num_steps {
        let a = pass_or_step(&mut first);
        let b = pass_or_step(&mut second);
        if a != b || first.state_hash() != second.state_hash() {
            return Some(step);
        }
    }

    None
}

fn pass_or_step(battle: &mut Battle) -> Option<StepResult> {
    match battle.step() {
        Ok(StepResult::AwaitingPlayer) => {
            battle.end_player_turn().ok()?;
            Some(StepResult::AwaitingPlayer)
        }
        other => other.ok(),
    }
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for grid and scheduler testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use tactics_core::cell::Cell;
    use tactics_core::navmesh::GroundSource;

    /// A cell inside a `width` x `height` rectangle.
    pub fn arb_cell(width: i32, height: i32) -> impl Strategy<Value = Cell> {
        (0..width, 0..height).prop_map(|(x, y)| Cell::new(x, y))
    }

    /// Up to `max` distinct obstacle cells inside the rectangle.
    pub fn arb_obstacles(width: i32, height: i32, max: usize) -> impl Strategy<Value = BTreeSet<Cell>> {
        proptest::collection::btree_set(arb_cell(width, height), 0..=max)
    }

    /// Rectangular terrain with random obstacles, plus its dimensions.
    pub fn arb_ground(max_side: i32) -> impl Strategy<Value = (GroundSource, i32, i32)> {
        (2..=max_side, 2..=max_side).prop_flat_map(|(width, height)| {
            let max = usize::try_from(width * height / 3).unwrap_or(0);
            arb_obstacles(width, height, max).prop_map(move |obstacles| {
                let source = obstacles
                    .into_iter()
                    .fold(GroundSource::rectangle(width, height), GroundSource::with_obstacle);
                (source, width, height)
            })
        })
    }

    /// Action priorities, including duplicates.
    pub fn arb_priorities(max_len: usize) -> impl Strategy<Value = Vec<i32>> {
        proptest::collection::vec(-5i32..5i32, 0..max_len)
    }

    /// Generate health values (1-20).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..20u32
    }

    /// Generate damage values (0-10).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        0u32..10u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{open_world, BattleBuilder};
    use tactics_core::cell::Cell;

    fn skirmish() -> Battle {
        BattleBuilder::new(open_world(6, 6))
            .player(Cell::new(0, 0), 10)
            .chaser(Cell::new(5, 5), 3, 1)
            .chaser(Cell::new(5, 0), 3, 0)
            .seed(7)
            .build()
    }

    #[test]
    fn test_verify_determinism_trivial() {
        let result = verify_determinism(3, 10, || 0u64, |n| *n += 1, |n| *n);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes(), vec![10]);
    }

    #[test]
    fn test_battle_is_deterministic() {
        verify_battle_determinism(skirmish, 3, 6).assert_deterministic();
    }

    #[test]
    fn test_no_divergence() {
        assert_eq!(find_first_divergence(skirmish, 200), None);
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1, "a")), compute_hash(&(1, "a")));
    }
}
