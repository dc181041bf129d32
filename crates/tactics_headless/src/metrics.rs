//! Battle metrics collection for balance analysis.
//!
//! A [`MetricsCollector`] watches one battle as a round observer and
//! produces [`GameMetrics`]; [`BatchSummary`] aggregates many of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tactics_core::battle::{Battle, Outcome};
use tactics_core::events::{BattleEvent, RoundObserver};
use tactics_core::units::{Faction, UnitId};

use crate::scenario::Scenario;

/// Complete metrics for a single battle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Unique game identifier.
    pub game_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Rounds started.
    pub rounds: u32,
    /// Final outcome. `None` if the round limit cut the battle short.
    pub outcome: Option<Outcome>,

    // === Combat ===
    /// Damage taken by hostile and neutral units.
    pub damage_dealt: u64,
    /// Damage taken by the player.
    pub damage_taken: u64,
    /// Hostile units killed.
    pub hostiles_killed: u32,
    /// Deaths by template id.
    pub kills_by_template: BTreeMap<String, u32>,
    /// Hits redirected to a protector.
    pub damage_redirected: u32,

    // === Board ===
    /// Units spawned after the battle started.
    pub units_spawned: u32,
    /// Hazards placed.
    pub hazards_created: u32,
    /// Status effects attached.
    pub statuses_applied: u32,

    // === Queue ===
    /// Actions that ran to completion.
    pub actions_completed: u32,
    /// Actions withdrawn before running.
    pub actions_cancelled: u32,

    /// Final simulation state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl GameMetrics {
    /// Create a new game metrics instance.
    #[must_use]
    pub fn new(game_id: impl Into<String>, scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            game_id: game_id.into(),
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// True if the player won.
    #[must_use]
    pub fn is_victory(&self) -> bool {
        self.outcome == Some(Outcome::Victory)
    }

    /// Record a death of a unit built from `template`.
    pub fn record_kill(&mut self, template: &str) {
        *self
            .kills_by_template
            .entry(template.to_string())
            .or_default() += 1;
    }
}

/// Summary statistics across multiple battles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total games played.
    pub total_games: u32,
    /// Player victories.
    pub victories: u32,
    /// Player defeats.
    pub defeats: u32,
    /// Games stopped by the round limit.
    pub unfinished: u32,
    /// Fraction of games won.
    pub victory_rate: f64,
    /// Average rounds per game.
    pub avg_rounds: f64,
    /// Shortest game.
    pub min_rounds: u32,
    /// Longest game.
    pub max_rounds: u32,
    /// Average damage the player took.
    pub avg_damage_taken: f64,
    /// Average hostiles killed.
    pub avg_hostiles_killed: f64,
    /// Deaths by template across all games.
    pub kills_by_template: BTreeMap<String, u32>,
}

impl BatchSummary {
    /// Calculate summary from a list of game metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_games: u32::try_from(games.len()).unwrap_or(u32::MAX),
            min_rounds: u32::MAX,
            ..Default::default()
        };

        let mut rounds_sum = 0u64;
        let mut damage_sum = 0u64;
        let mut kills_sum = 0u64;

        for game in games {
            match game.outcome {
                Some(Outcome::Victory) => summary.victories += 1,
                Some(Outcome::Defeat) => summary.defeats += 1,
                _ => summary.unfinished += 1,
            }

            rounds_sum += u64::from(game.rounds);
            summary.min_rounds = summary.min_rounds.min(game.rounds);
            summary.max_rounds = summary.max_rounds.max(game.rounds);
            damage_sum += game.damage_taken;
            kills_sum += u64::from(game.hostiles_killed);

            for (template, count) in &game.kills_by_template {
                *summary
                    .kills_by_template
                    .entry(template.clone())
                    .or_default() += count;
            }
        }

        let n = f64::from(summary.total_games);
        summary.victory_rate = f64::from(summary.victories) / n;
        summary.avg_rounds = rounds_sum as f64 / n;
        summary.avg_damage_taken = damage_sum as f64 / n;
        summary.avg_hostiles_killed = kills_sum as f64 / n;
        summary
    }

    /// Check the player wins between `min` and `max` of the time.
    #[must_use]
    pub fn is_balanced(&self, min: f64, max: f64) -> bool {
        self.total_games > 0 && (min..=max).contains(&self.victory_rate)
    }
}

/// Metrics collector that tracks events during a battle.
///
/// Spawn events for units placed before an observer is attached are never
/// delivered, so the collector learns the starting roster from the world.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// Current game metrics.
    metrics: GameMetrics,
    /// Faction and template of every unit seen so far.
    units: BTreeMap<UnitId, (Faction, String)>,
    /// Template factions, for units spawned mid-battle.
    template_factions: BTreeMap<String, Faction>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    #[must_use]
    pub fn new(game_id: &str, scenario: &str, seed: u64) -> Self {
        Self {
            metrics: GameMetrics::new(game_id, scenario, seed),
            ..Default::default()
        }
    }

    /// Collector primed with the scenario's templates and the battle's
    /// current roster.
    #[must_use]
    pub fn for_battle(game_id: &str, scenario: &Scenario, seed: u64, battle: &Battle) -> Self {
        let mut collector = Self::new(game_id, &scenario.name, seed);
        collector.template_factions = scenario
            .templates
            .iter()
            .map(|t| (t.id.clone(), t.faction))
            .collect();
        for unit in battle.world().units() {
            collector
                .units
                .insert(unit.id, (unit.faction, unit.template.clone()));
        }
        collector
    }

    /// Metrics gathered so far.
    #[must_use]
    pub fn metrics(&self) -> &GameMetrics {
        &self.metrics
    }

    /// Stamp the final state and hand over the metrics.
    #[must_use]
    pub fn finish(mut self, battle: &Battle) -> GameMetrics {
        self.finalize(battle);
        self.metrics
    }

    /// Stamp the final state into the metrics in place.
    pub fn finalize(&mut self, battle: &Battle) {
        let outcome = battle.outcome();
        self.metrics.outcome = (outcome != Outcome::Ongoing).then_some(outcome);
        self.metrics.rounds = battle.round();
        self.metrics.final_state_hash = battle.state_hash();
    }

    fn faction_of(&self, unit: UnitId) -> Option<Faction> {
        self.units.get(&unit).map(|(faction, _)| *faction)
    }
}

impl RoundObserver for MetricsCollector {
    fn notify(&mut self, event: &BattleEvent) {
        match event {
            BattleEvent::RoundStarted { round } => self.metrics.rounds = *round,
            BattleEvent::UnitDamaged { unit, amount, .. } => match self.faction_of(*unit) {
                Some(Faction::Player) => self.metrics.damage_taken += u64::from(*amount),
                _ => self.metrics.damage_dealt += u64::from(*amount),
            },
            BattleEvent::DamageRedirected { .. } => self.metrics.damage_redirected += 1,
            BattleEvent::UnitDied { unit, .. } => {
                if let Some((faction, template)) = self.units.get(unit).cloned() {
                    if faction == Faction::Hostile {
                        self.metrics.hostiles_killed += 1;
                    }
                    self.metrics.record_kill(&template);
                }
            }
            BattleEvent::UnitSpawned { unit, template, .. } => {
                let faction = self
                    .template_factions
                    .get(template)
                    .copied()
                    .unwrap_or(Faction::Hostile);
                self.units.insert(*unit, (faction, template.clone()));
                self.metrics.units_spawned += 1;
            }
            BattleEvent::HazardCreated { .. } => self.metrics.hazards_created += 1,
            BattleEvent::StatusApplied { .. } => self.metrics.statuses_applied += 1,
            BattleEvent::ActionCompleted { .. } => self.metrics.actions_completed += 1,
            BattleEvent::ActionCancelled { .. } => self.metrics.actions_cancelled += 1,
            BattleEvent::BattleEnded { outcome } => self.metrics.outcome = Some(*outcome),
            _ => {}
        }
    }
}
