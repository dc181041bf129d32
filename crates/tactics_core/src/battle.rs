//! Round controller: phases, turn order, and the step loop.
//!
//! A [`Battle`] owns the [`World`], the [`TurnScheduler`], every hostile's
//! behavior and the observers. Setup is two-phase: construct, register units
//! and observers, then [`Battle::start`]. From there the caller alternates
//! between player input in the `Player` phase and [`Battle::step`] (or
//! [`Battle::run_until_player_phase`]) for everything else.
//!
//! Round structure:
//!
//! 1. Round start: hazards tick, every hostile stages its action.
//! 2. `Player` phase: the player acts via [`Battle::perform_player_action`]
//!    until [`Battle::end_player_turn`].
//! 3. `Enemy` phase: staged actions are promoted and executed in priority
//!    order, one at a time, each to completion. Actions re-staged by units
//!    displaced along the way run next, before any movement.
//! 4. Movement pass: each hostile in priority order decides a move, which
//!    runs before the next hostile decides.
//! 5. Round end, back to 1.
//!
//! The opening movement pass runs once in the `Transition` phase before
//! round 1.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::behavior::{DecisionContext, HostileBehavior, UnitFactory};
use crate::cell::Cell;
use crate::error::{GameError, Result};
use crate::events::{BattleEvent, RoundObserver};
use crate::execution::{ActionTask, ExecContext, StepState};
use crate::rng::DeterministicRng;
use crate::scheduler::{ActionId, QueuedAction, TurnScheduler};
use crate::units::{Faction, UnitId, UnitSpawnParams};
use crate::world::World;

/// Which side is acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for player input.
    Player,
    /// Hostile actions and movement resolve.
    Enemy,
    /// Between rounds, and the opening movement pass.
    Transition,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Player => "player",
            Self::Enemy => "enemy",
            Self::Transition => "transition",
        };
        f.write_str(name)
    }
}

/// How the battle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// No hostiles left.
    Victory,
    /// The player is dead.
    Defeat,
    /// Still going.
    Ongoing,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Victory => "victory",
            Self::Defeat => "defeat",
            Self::Ongoing => "ongoing",
        };
        f.write_str(name)
    }
}

/// Result of one [`Battle::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Something happened; keep stepping.
    Advanced,
    /// Nothing to do until the player acts or ends the turn.
    AwaitingPlayer,
    /// The battle is decided.
    BattleOver(Outcome),
}

#[derive(Debug)]
enum Stage {
    Idle,
    HostileActions,
    Movement {
        pending: VecDeque<UnitId>,
        current: Option<UnitId>,
    },
}

/// Extra promotions per enemy phase for actions staged by displaced units.
const MAX_REAIM_PASSES: u32 = 4;

#[derive(Debug)]
struct ActiveAction {
    unit: UnitId,
    id: ActionId,
    task: ActionTask,
    steps: u32,
}

/// The round controller.
pub struct Battle {
    world: World,
    scheduler: TurnScheduler<Action>,
    behaviors: BTreeMap<UnitId, Box<dyn HostileBehavior>>,
    observers: Vec<Box<dyn RoundObserver>>,
    factory: Box<dyn UnitFactory>,
    rng: DeterministicRng,
    phase: Phase,
    round: u32,
    started: bool,
    finished: Option<Outcome>,
    stage: Stage,
    active: Option<ActiveAction>,
    turn_started: BTreeSet<UnitId>,
    reaim_passes: u32,
    log: Vec<BattleEvent>,
}

impl fmt::Debug for Battle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Battle")
            .field("round", &self.round)
            .field("phase", &self.phase)
            .field("stage", &self.stage)
            .field("units", &self.world.units().count())
            .field("queued", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

impl Battle {
    /// Wrap a world. Units can still be added until [`start`](Self::start).
    #[must_use]
    pub fn new(world: World, factory: Box<dyn UnitFactory>) -> Self {
        Self {
            world,
            scheduler: TurnScheduler::new(),
            behaviors: BTreeMap::new(),
            observers: Vec::new(),
            factory,
            rng: DeterministicRng::default(),
            phase: Phase::Transition,
            round: 0,
            started: false,
            finished: None,
            stage: Stage::Idle,
            active: None,
            turn_started: BTreeSet::new(),
            reaim_passes: 0,
            log: Vec::new(),
        }
    }

    /// Seed the battle's randomness.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = DeterministicRng::new(seed);
        self
    }

    /// Add a unit, optionally driven by `behavior`.
    pub fn spawn_unit(
        &mut self,
        params: &UnitSpawnParams,
        cell: Cell,
        behavior: Option<Box<dyn HostileBehavior>>,
    ) -> Result<UnitId> {
        let id = self.world.spawn_unit(params, cell)?;
        if let Some(behavior) = behavior {
            self.behaviors.insert(id, behavior);
        }
        self.flush();
        Ok(id)
    }

    /// Subscribe to battle events.
    pub fn add_observer(&mut self, observer: Box<dyn RoundObserver>) {
        self.observers.push(observer);
    }

    /// The simulation state.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round, 0 before the first round starts.
    #[must_use]
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether [`start`](Self::start) succeeded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Pending actions (staged and queued).
    #[must_use]
    pub fn scheduler(&self) -> &TurnScheduler<Action> {
        &self.scheduler
    }

    /// Validate wiring and begin the opening movement pass.
    ///
    /// Fails if called twice or unless exactly one player unit exists.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(GameError::Wiring(String::from("battle already started")));
        }
        let players = self.world.player_count();
        if players != 1 {
            return Err(GameError::Wiring(format!(
                "expected exactly one player unit, found {players}"
            )));
        }

        self.started = true;
        info!(units = self.world.units().count(), "battle started");
        self.world.emit(BattleEvent::BattleStarted);
        self.phase = Phase::Transition;
        self.world.emit(BattleEvent::PhaseStarted {
            phase: Phase::Transition,
            round: self.round,
        });
        self.begin_movement_pass();
        self.flush();
        Ok(())
    }

    /// Advance the simulation by one step.
    pub fn step(&mut self) -> Result<StepResult> {
        self.ensure_started()?;
        if let Some(outcome) = self.finished {
            return Ok(StepResult::BattleOver(outcome));
        }

        let result = self.advance();
        self.settle();
        let result = result?;
        match self.check_outcome() {
            Some(outcome) => Ok(StepResult::BattleOver(outcome)),
            None => Ok(result),
        }
    }

    /// Step until the player can act or the battle ends.
    pub fn run_until_player_phase(&mut self, max_steps: u32) -> Result<StepResult> {
        for _ in 0..max_steps {
            match self.step()? {
                StepResult::Advanced => {}
                other => return Ok(other),
            }
        }
        Err(GameError::InvalidState(format!(
            "player phase not reached within {max_steps} steps"
        )))
    }

    /// Hand over to the enemy. Returns false (and does nothing) outside the
    /// player phase.
    pub fn end_player_turn(&mut self) -> Result<bool> {
        self.ensure_started()?;
        if self.finished.is_some() || self.phase != Phase::Player {
            debug!(phase = %self.phase, "end_player_turn ignored");
            return Ok(false);
        }

        if let Some(player) = self.world.player_id() {
            self.world.run_turn_end(player);
        }
        self.world.emit(BattleEvent::PhaseEnded {
            phase: Phase::Player,
            round: self.round,
        });
        self.phase = Phase::Enemy;
        info!(round = self.round, "enemy phase");
        self.world.emit(BattleEvent::PhaseStarted {
            phase: Phase::Enemy,
            round: self.round,
        });

        self.scheduler.promote();
        self.stage = Stage::HostileActions;
        self.reaim_passes = 0;
        self.settle();
        self.check_outcome();
        Ok(true)
    }

    /// Run a player action to completion, paying `ap_cost` up front.
    ///
    /// Returns the number of steps it took. If the action fails or stalls the
    /// points stay spent; every unit snaps back to its registered cell and the
    /// action is reported as cancelled.
    pub fn perform_player_action(&mut self, action: Action, ap_cost: u32) -> Result<u32> {
        self.ensure_started()?;
        if let Some(outcome) = self.finished {
            return Err(GameError::InvalidState(format!("battle is over ({outcome})")));
        }
        if self.phase != Phase::Player || self.active.is_some() {
            return Err(GameError::WrongPhase {
                phase: self.phase.to_string(),
            });
        }
        let player = self
            .world
            .player_id()
            .ok_or_else(|| GameError::InvalidState(String::from("no player unit")))?;
        self.world.spend_action_points(player, ap_cost)?;

        let id = self.scheduler.reserve_id();
        let kind = action.kind();
        debug!(action = id, %kind, ap_cost, "player action");
        self.world.emit(BattleEvent::ActionStarted {
            unit: player,
            action: id,
            kind,
        });

        let max_steps = self.world.config().max_steps_per_action;
        let mut task = ActionTask::new(action);
        let mut steps = 0;
        loop {
            let state = self.drive(&mut task);
            steps += 1;
            self.settle();
            let state = match state {
                Ok(state) => state,
                Err(err) => {
                    self.abort_action(player, id);
                    return Err(err);
                }
            };
            if state == StepState::Done {
                break;
            }
            if steps >= max_steps {
                self.abort_action(player, id);
                return Err(GameError::ActionStalled {
                    unit: player,
                    action: id,
                    steps: max_steps,
                });
            }
        }

        self.world.emit(BattleEvent::ActionCompleted {
            unit: player,
            action: id,
            steps,
        });
        self.settle();
        self.check_outcome();
        Ok(steps)
    }

    /// Action point cost for the player to walk `tiles` tiles.
    #[must_use]
    pub fn move_cost(&self, tiles: u32) -> u32 {
        let multiplier = self
            .world
            .player_id()
            .and_then(|id| self.world.unit(id))
            .map_or(1, |u| u.move_cost_multiplier());
        tiles * self.world.config().player_move_cost * multiplier
    }

    /// A move action for the player to `destination`, with its cost.
    #[must_use]
    pub fn player_move(&self, destination: Cell) -> Option<(Action, u32)> {
        let player = self.world.player_id().and_then(|id| self.world.unit(id))?;
        let path = self.world.grid().path_between(player.cell, destination)?;
        if path.is_empty() {
            return None;
        }
        let cost = self.move_cost(u32::try_from(path.len()).ok()?);
        let action = Action::Move {
            unit: player.id,
            waypoints: path,
            speed: self.world.config().move_speed,
        };
        Some((action, cost))
    }

    /// Victory when no hostiles remain, defeat when the player is gone.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if !self.started {
            return Outcome::Ongoing;
        }
        if self.world.player_id().is_none() {
            Outcome::Defeat
        } else if self.world.units().all(|u| u.faction != Faction::Hostile) {
            Outcome::Victory
        } else {
            Outcome::Ongoing
        }
    }

    /// Events since the last call.
    pub fn take_events(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.log)
    }

    /// Hash of the world plus round bookkeeping.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.world.state_hash().hash(&mut hasher);
        self.round.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.scheduler.len().hash(&mut hasher);
        self.rng.hash(&mut hasher);
        hasher.finish()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(GameError::InvalidState(String::from("battle not started")))
        }
    }

    fn advance(&mut self) -> Result<StepResult> {
        if let Some(active) = self.active.take() {
            return self.step_active(active);
        }

        match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Idle => {
                if self.phase == Phase::Player {
                    Ok(StepResult::AwaitingPlayer)
                } else {
                    Err(GameError::InvalidState(format!(
                        "no work scheduled in {} phase",
                        self.phase
                    )))
                }
            }
            Stage::HostileActions => {
                match self.scheduler.next() {
                    Some((unit, queued)) => {
                        self.stage = Stage::HostileActions;
                        self.begin_action(unit, queued);
                    }
                    None if self.scheduler.buffered_len() > 0
                        && self.reaim_passes < MAX_REAIM_PASSES =>
                    {
                        self.reaim_passes += 1;
                        debug!(staged = self.scheduler.buffered_len(), "promoting re-aimed actions");
                        self.scheduler.promote();
                        self.stage = Stage::HostileActions;
                    }
                    None => self.begin_movement_pass(),
                }
                Ok(StepResult::Advanced)
            }
            Stage::Movement {
                pending,
                current: Some(unit),
            } => {
                if let Some((owner, queued)) = self.scheduler.next() {
                    self.stage = Stage::Movement {
                        pending,
                        current: Some(unit),
                    };
                    self.begin_action(owner, queued);
                } else {
                    self.world.run_turn_end(unit);
                    self.stage = Stage::Movement {
                        pending,
                        current: None,
                    };
                }
                Ok(StepResult::Advanced)
            }
            Stage::Movement {
                mut pending,
                current: None,
            } => {
                match pending.pop_front() {
                    Some(unit) => {
                        self.decide_move(unit);
                        self.stage = Stage::Movement {
                            pending,
                            current: Some(unit),
                        };
                    }
                    None => self.finish_movement_pass(),
                }
                Ok(StepResult::Advanced)
            }
        }
    }

    fn step_active(&mut self, mut active: ActiveAction) -> Result<StepResult> {
        let state = match self.drive(&mut active.task) {
            Ok(state) => state,
            Err(err) => {
                self.abort_action(active.unit, active.id);
                return Err(err);
            }
        };
        active.steps += 1;

        match state {
            StepState::Done => {
                debug!(unit = active.unit, action = active.id, steps = active.steps, "action completed");
                self.world.emit(BattleEvent::ActionCompleted {
                    unit: active.unit,
                    action: active.id,
                    steps: active.steps,
                });
            }
            StepState::Running => {
                let max_steps = self.world.config().max_steps_per_action;
                if active.steps >= max_steps {
                    self.abort_action(active.unit, active.id);
                    return Err(GameError::ActionStalled {
                        unit: active.unit,
                        action: active.id,
                        steps: max_steps,
                    });
                }
                self.active = Some(active);
            }
        }
        Ok(StepResult::Advanced)
    }

    /// Drop a half-run action: uncommitted travel is discarded.
    fn abort_action(&mut self, unit: UnitId, action: ActionId) {
        warn!(unit, action, "action aborted");
        self.world.snap_to_cells();
        self.world.emit(BattleEvent::ActionCancelled { unit, action });
        self.settle();
    }

    /// One step of `task`, adopting the behaviors of any spawned units.
    fn drive(&mut self, task: &mut ActionTask) -> Result<StepState> {
        let mut ctx = ExecContext::new(&mut self.world, self.factory.as_mut());
        let state = task.step(&mut ctx);
        for (unit, behavior) in ctx.take_spawned() {
            if let Some(behavior) = behavior {
                self.behaviors.insert(unit, behavior);
            }
        }
        state
    }

    fn begin_action(&mut self, unit: UnitId, queued: QueuedAction<Action>) {
        if self.turn_started.insert(unit) {
            self.world.run_turn_start(unit);
        }
        if !self.world.is_alive(unit) {
            debug!(unit, action = queued.id, "owner died before acting");
            self.world.emit(BattleEvent::ActionCancelled {
                unit,
                action: queued.id,
            });
            return;
        }

        let kind = queued.action.kind();
        debug!(unit, action = queued.id, %kind, "action started");
        self.world.emit(BattleEvent::ActionStarted {
            unit,
            action: queued.id,
            kind,
        });
        self.active = Some(ActiveAction {
            unit,
            id: queued.id,
            task: ActionTask::new(queued.action),
            steps: 0,
        });
    }

    fn begin_movement_pass(&mut self) {
        let pending: VecDeque<UnitId> = self.world.hostiles_by_priority().into();
        debug!(units = pending.len(), phase = %self.phase, "movement pass");
        self.stage = Stage::Movement {
            pending,
            current: None,
        };
    }

    fn decide_move(&mut self, unit: UnitId) {
        if !self.world.is_alive(unit) {
            return;
        }
        if self.turn_started.insert(unit) {
            self.world.run_turn_start(unit);
            if !self.world.is_alive(unit) {
                return;
            }
        }
        let mark = self.scheduler.buffered_len();
        if let Some(behavior) = self.behaviors.get_mut(&unit) {
            let mut ctx = DecisionContext::new(&mut self.world, &mut self.scheduler, &mut self.rng, unit);
            behavior.decide_move(&mut ctx);
        }
        self.scheduler.promote_since(mark);
    }

    fn finish_movement_pass(&mut self) {
        let ending = self.phase;
        self.world.emit(BattleEvent::PhaseEnded {
            phase: ending,
            round: self.round,
        });
        if ending == Phase::Enemy {
            info!(round = self.round, "round ended");
            self.world.emit(BattleEvent::RoundEnded { round: self.round });
        }
        self.start_round();
    }

    fn start_round(&mut self) {
        self.round += 1;
        info!(round = self.round, "round started");
        self.world.emit(BattleEvent::RoundStarted { round: self.round });
        self.world.tick_hazards();
        self.turn_started.clear();

        for unit in self.world.hostiles_by_priority() {
            if let Some(behavior) = self.behaviors.get_mut(&unit) {
                let mut ctx = DecisionContext::new(&mut self.world, &mut self.scheduler, &mut self.rng, unit);
                behavior.decide_action(&mut ctx);
            }
        }
        self.start_player_turn();
    }

    fn start_player_turn(&mut self) {
        self.phase = Phase::Player;
        self.stage = Stage::Idle;
        self.world.emit(BattleEvent::PhaseStarted {
            phase: Phase::Player,
            round: self.round,
        });
        if let Some(player) = self.world.player_id() {
            self.world.run_turn_start(player);
            self.world.restore_action_points(player);
        }
    }

    /// React to deaths and displacements, then deliver events.
    fn settle(&mut self) {
        for dead in self.world.take_deaths() {
            for action in self.scheduler.cancel_unit(dead) {
                self.world.emit(BattleEvent::ActionCancelled { unit: dead, action });
            }
            if self.behaviors.remove(&dead).is_some() {
                debug!(unit = dead, "behavior dropped");
            }
        }

        for unit in self.world.take_displaced() {
            if !self.world.is_alive(unit) {
                continue;
            }
            if let Some(behavior) = self.behaviors.get_mut(&unit) {
                let mut ctx = DecisionContext::new(&mut self.world, &mut self.scheduler, &mut self.rng, unit);
                behavior.on_displaced(&mut ctx);
            }
        }
        self.flush();
    }

    fn flush(&mut self) {
        let events = self.world.take_events();
        if events.is_empty() {
            return;
        }
        for event in &events {
            for (index, observer) in self.observers.iter_mut().enumerate() {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.notify(event)));
                if delivered.is_err() {
                    warn!(observer = index, "round observer panicked, event skipped");
                }
            }
        }
        self.log.extend(events);
    }

    fn check_outcome(&mut self) -> Option<Outcome> {
        if let Some(outcome) = self.finished {
            return Some(outcome);
        }
        let outcome = self.outcome();
        if outcome == Outcome::Ongoing {
            return None;
        }
        info!(%outcome, round = self.round, "battle ended");
        self.finished = Some(outcome);
        self.world.emit(BattleEvent::BattleEnded { outcome });
        self.flush();
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::NullFactory;
    use crate::cell::Direction;
    use crate::data::BattleConfig;
    use crate::events::EventRecorder;
    use crate::navmesh::GroundSource;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Hits the player when adjacent, otherwise steps toward it.
    struct Brawler {
        damage: u32,
    }

    impl HostileBehavior for Brawler {
        fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
            let (Some(me), Some(player)) = (ctx.me(), ctx.player()) else {
                return;
            };
            if me.cell.is_adjacent(player.cell) {
                let cell = player.cell;
                ctx.submit(Action::SingleDamage {
                    cell,
                    amount: self.damage,
                });
            }
        }

        fn decide_move(&mut self, ctx: &mut DecisionContext<'_>) {
            let (Some(me), Some(player)) = (ctx.me(), ctx.player()) else {
                return;
            };
            if me.cell.is_adjacent(player.cell) {
                return;
            }
            let next = me.cell.step(Direction::toward(me.cell, player.cell));
            if ctx.grid().is_free(next) {
                let unit = me.id;
                ctx.submit(Action::Move {
                    unit,
                    waypoints: vec![next],
                    speed: crate::math::Fixed::ONE,
                });
            }
        }
    }

    fn world(width: i32, height: i32) -> World {
        World::new(&GroundSource::rectangle(width, height), BattleConfig::default())
    }

    fn player() -> UnitSpawnParams {
        UnitSpawnParams::player(5, BattleConfig::default().player_budget())
    }

    fn battle_with(hostiles: &[(Cell, i32)]) -> (Battle, UnitId, Vec<UnitId>) {
        let mut battle = Battle::new(world(6, 1), Box::new(NullFactory));
        let hero = battle.spawn_unit(&player(), Cell::new(0, 0), None).unwrap();
        let ids = hostiles
            .iter()
            .map(|&(cell, priority)| {
                battle
                    .spawn_unit(
                        &UnitSpawnParams::hostile("brawler", 2, priority),
                        cell,
                        Some(Box::new(Brawler { damage: 1 })),
                    )
                    .unwrap()
            })
            .collect();
        (battle, hero, ids)
    }

    fn hp(battle: &Battle, id: UnitId) -> Option<u32> {
        battle.world().unit(id).and_then(|u| u.health).map(|h| h.current)
    }

    #[test]
    fn test_start_requires_exactly_one_player() {
        let mut empty = Battle::new(world(3, 1), Box::new(NullFactory));
        assert!(matches!(empty.start(), Err(GameError::Wiring(_))));

        let mut two = Battle::new(world(3, 1), Box::new(NullFactory));
        two.spawn_unit(&player(), Cell::new(0, 0), None).unwrap();
        two.spawn_unit(&player(), Cell::new(2, 0), None).unwrap();
        assert!(matches!(two.start(), Err(GameError::Wiring(_))));
    }

    #[test]
    fn test_start_twice_is_wiring_error() {
        let (mut battle, _, _) = battle_with(&[(Cell::new(5, 0), 0)]);
        battle.start().unwrap();
        assert!(matches!(battle.start(), Err(GameError::Wiring(_))));
    }

    #[test]
    fn test_step_before_start_fails() {
        let (mut battle, _, _) = battle_with(&[]);
        assert!(battle.step().is_err());
    }

    #[test]
    fn test_opening_pass_then_player_phase() {
        let (mut battle, hero, ids) = battle_with(&[(Cell::new(3, 0), 0)]);
        battle.start().unwrap();
        assert_eq!(battle.phase(), Phase::Transition);

        let result = battle.run_until_player_phase(100).unwrap();
        assert_eq!(result, StepResult::AwaitingPlayer);
        assert_eq!(battle.phase(), Phase::Player);
        assert_eq!(battle.round(), 1);
        // Opening pass moved the brawler one tile closer.
        assert_eq!(battle.world().unit(ids[0]).map(|u| u.cell), Some(Cell::new(2, 0)));
        let ap = battle.world().unit(hero).and_then(|u| u.action_points).unwrap();
        assert_eq!(ap.current, 5);
    }

    #[test]
    fn test_enemy_phase_executes_staged_attack() {
        let (mut battle, hero, _) = battle_with(&[(Cell::new(1, 0), 0)]);
        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();
        assert_eq!(battle.scheduler().buffered_len(), 1);

        assert!(battle.end_player_turn().unwrap());
        assert_eq!(battle.phase(), Phase::Enemy);
        assert!(!battle.end_player_turn().unwrap());

        battle.run_until_player_phase(100).unwrap();
        assert_eq!(hp(&battle, hero), Some(4));
        assert_eq!(battle.round(), 2);
    }

    #[test]
    fn test_actions_run_in_priority_order() {
        let mut battle = Battle::new(world(3, 3), Box::new(NullFactory));
        battle.spawn_unit(&player(), Cell::new(1, 1), None).unwrap();
        let slow = battle
            .spawn_unit(
                &UnitSpawnParams::hostile("slow", 2, 5),
                Cell::new(0, 1),
                Some(Box::new(Brawler { damage: 1 })),
            )
            .unwrap();
        let fast = battle
            .spawn_unit(
                &UnitSpawnParams::hostile("fast", 2, 1),
                Cell::new(2, 1),
                Some(Box::new(Brawler { damage: 1 })),
            )
            .unwrap();

        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();
        battle.take_events();
        battle.end_player_turn().unwrap();
        battle.run_until_player_phase(100).unwrap();

        let started: Vec<UnitId> = battle
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                BattleEvent::ActionStarted { unit, .. } => Some(unit),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![fast, slow]);
    }

    #[test]
    fn test_player_action_phase_and_budget_checks() {
        let (mut battle, _, ids) = battle_with(&[(Cell::new(1, 0), 0)]);
        battle.start().unwrap();
        let hit = Action::SingleDamage {
            cell: Cell::new(1, 0),
            amount: 1,
        };
        assert!(matches!(
            battle.perform_player_action(hit.clone(), 1),
            Err(GameError::WrongPhase { .. })
        ));

        battle.run_until_player_phase(100).unwrap();
        assert!(matches!(
            battle.perform_player_action(hit.clone(), 99),
            Err(GameError::InsufficientActionPoints { required: 99, .. })
        ));
        assert_eq!(hp(&battle, ids[0]), Some(2));

        assert_eq!(battle.perform_player_action(hit, 1).unwrap(), 1);
        assert_eq!(hp(&battle, ids[0]), Some(1));
    }

    #[test]
    fn test_killing_last_hostile_is_victory_and_cancels_its_actions() {
        let (mut battle, _, ids) = battle_with(&[(Cell::new(1, 0), 0)]);
        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();
        assert_eq!(battle.scheduler().pending_for(ids[0]).count(), 1);

        let kill = Action::SingleDamage {
            cell: Cell::new(1, 0),
            amount: 10,
        };
        battle.perform_player_action(kill, 1).unwrap();
        assert_eq!(battle.outcome(), Outcome::Victory);
        assert_eq!(battle.scheduler().pending_for(ids[0]).count(), 0);
        assert_eq!(battle.step().unwrap(), StepResult::BattleOver(Outcome::Victory));

        let events = battle.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, BattleEvent::ActionCancelled { unit, .. } if *unit == ids[0])));
        assert!(events.contains(&BattleEvent::BattleEnded {
            outcome: Outcome::Victory
        }));
    }

    #[test]
    fn test_player_death_is_defeat() {
        let mut battle = Battle::new(world(3, 1), Box::new(NullFactory));
        battle
            .spawn_unit(&UnitSpawnParams::player(1, BattleConfig::default().player_budget()), Cell::new(0, 0), None)
            .unwrap();
        battle
            .spawn_unit(
                &UnitSpawnParams::hostile("brute", 3, 0),
                Cell::new(1, 0),
                Some(Box::new(Brawler { damage: 3 })),
            )
            .unwrap();
        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();
        battle.end_player_turn().unwrap();
        let result = battle.run_until_player_phase(100).unwrap();
        assert_eq!(result, StepResult::BattleOver(Outcome::Defeat));
    }

    #[test]
    fn test_stalled_action_reports_error() {
        let config = BattleConfig {
            max_steps_per_action: 2,
            ..BattleConfig::default()
        };
        let mut battle = Battle::new(
            World::new(&GroundSource::rectangle(6, 1), config),
            Box::new(NullFactory),
        );
        let hero = battle.spawn_unit(&player(), Cell::new(0, 0), None).unwrap();
        battle
            .spawn_unit(&UnitSpawnParams::hostile("idle", 1, 0), Cell::new(5, 0), None)
            .unwrap();
        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();

        let crawl = Action::Move {
            unit: hero,
            waypoints: vec![Cell::new(1, 0), Cell::new(2, 0), Cell::new(3, 0)],
            speed: crate::math::Fixed::from_num(0.25),
        };
        assert!(matches!(
            battle.perform_player_action(crawl, 1),
            Err(GameError::ActionStalled { steps: 2, .. })
        ));

        let unit = battle.world().unit(hero).unwrap();
        assert_eq!(unit.cell, Cell::new(0, 0));
        assert_eq!(unit.world_position, battle.world().grid().world_position(Cell::new(0, 0)));
        assert_eq!(unit.action_points.map(|ap| ap.total()), Some(4));
        assert!(battle
            .take_events()
            .iter()
            .any(|e| matches!(e, BattleEvent::ActionCancelled { unit, .. } if *unit == hero)));
        assert_eq!(battle.phase(), Phase::Player);
    }

    #[test]
    fn test_player_move_cost() {
        let (mut battle, hero, _) = battle_with(&[(Cell::new(5, 0), 0)]);
        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();

        let (action, cost) = battle.player_move(Cell::new(2, 0)).unwrap();
        assert_eq!(cost, 2);
        battle.perform_player_action(action, cost).unwrap();
        assert_eq!(battle.world().unit(hero).map(|u| u.cell), Some(Cell::new(2, 0)));
        assert_eq!(battle.world().unit(hero).and_then(|u| u.action_points).map(|ap| ap.total()), Some(3));
    }

    /// Shoves whatever stands on `target` one tile right.
    struct Shover {
        target: Cell,
    }

    impl HostileBehavior for Shover {
        fn decide_action(&mut self, ctx: &mut DecisionContext<'_>) {
            ctx.submit(Action::Push {
                cell: self.target,
                direction: Direction::Right,
                distance: 1,
                speed: crate::math::Fixed::ONE,
            });
        }

        fn decide_move(&mut self, _ctx: &mut DecisionContext<'_>) {}
    }

    /// Only acts after being pushed.
    struct Dodger;

    impl HostileBehavior for Dodger {
        fn decide_action(&mut self, _ctx: &mut DecisionContext<'_>) {}

        fn decide_move(&mut self, _ctx: &mut DecisionContext<'_>) {}

        fn on_displaced(&mut self, ctx: &mut DecisionContext<'_>) {
            if let Some(cell) = ctx.player().map(|p| p.cell) {
                ctx.submit(Action::SingleDamage { cell, amount: 1 });
            }
        }
    }

    #[test]
    fn test_displaced_reaim_runs_before_movement_pass() {
        let mut battle = Battle::new(world(8, 1), Box::new(NullFactory));
        let hero = battle.spawn_unit(&player(), Cell::new(0, 0), None).unwrap();
        battle
            .spawn_unit(
                &UnitSpawnParams::hostile("shover", 2, 1),
                Cell::new(1, 0),
                Some(Box::new(Shover {
                    target: Cell::new(2, 0),
                })),
            )
            .unwrap();
        let dodger = battle
            .spawn_unit(
                &UnitSpawnParams::hostile("dodger", 2, 2),
                Cell::new(2, 0),
                Some(Box::new(Dodger)),
            )
            .unwrap();
        let brawler = battle
            .spawn_unit(
                &UnitSpawnParams::hostile("brawler", 2, 0),
                Cell::new(7, 0),
                Some(Box::new(Brawler { damage: 1 })),
            )
            .unwrap();

        battle.start().unwrap();
        battle.run_until_player_phase(200).unwrap();
        battle.take_events();
        battle.end_player_turn().unwrap();
        battle.run_until_player_phase(200).unwrap();

        let events = battle.take_events();
        let started = |who: UnitId| {
            events
                .iter()
                .position(|e| matches!(e, BattleEvent::ActionStarted { unit, .. } if *unit == who))
        };
        let reaim = started(dodger).expect("dodger never re-aimed");
        let step = started(brawler).expect("brawler never moved");
        assert!(reaim < step, "re-aim ran inside the movement pass");
        assert_eq!(hp(&battle, hero), Some(4));
        assert_eq!(battle.world().unit(dodger).map(|u| u.cell), Some(Cell::new(3, 0)));
        assert_eq!(battle.world().unit(brawler).map(|u| u.cell), Some(Cell::new(5, 0)));
    }

    struct Grumpy;

    impl RoundObserver for Grumpy {
        fn notify(&mut self, event: &BattleEvent) {
            if matches!(event, BattleEvent::RoundStarted { .. }) {
                panic!("observer failure");
            }
        }
    }

    #[test]
    fn test_observer_panic_does_not_stop_battle() {
        let (mut battle, _, _) = battle_with(&[(Cell::new(5, 0), 0)]);
        let recorder = Rc::new(RefCell::new(EventRecorder::default()));
        battle.add_observer(Box::new(Grumpy));
        battle.add_observer(Box::new(Rc::clone(&recorder)));

        battle.start().unwrap();
        battle.run_until_player_phase(100).unwrap();
        let recorder = recorder.borrow();
        let seen = &recorder.events;
        assert!(seen.contains(&BattleEvent::RoundStarted { round: 1 }));
        assert!(seen.contains(&BattleEvent::PhaseStarted {
            phase: Phase::Player,
            round: 1
        }));
    }

    #[test]
    fn test_same_setup_same_hash() {
        let run = || {
            let (mut battle, _, _) = battle_with(&[(Cell::new(4, 0), 1), (Cell::new(5, 0), 0)]);
            battle.start().unwrap();
            for _ in 0..3 {
                battle.run_until_player_phase(500).unwrap();
                battle.end_player_turn().unwrap();
            }
            (battle.state_hash(), battle.take_events())
        };
        assert_eq!(run(), run());
    }
}
