//! Interfaces for the collaborators that drive units.
//!
//! The core never decides what a hostile does. A [`HostileBehavior`] is
//! asked at fixed points of the round and answers by submitting actions
//! through its [`DecisionContext`]. New units come from a [`UnitFactory`].

use std::collections::BTreeSet;

use tracing::debug;

use crate::action::Action;
use crate::cell::Cell;
use crate::events::BattleEvent;
use crate::grid::{Distance, SpatialIndex};
use crate::rng::DeterministicRng;
use crate::scheduler::{ActionId, TurnScheduler};
use crate::units::{Unit, UnitId, UnitSpawnParams};
use crate::world::World;

/// Decision logic for one hostile unit.
pub trait HostileBehavior {
    /// Round start: stage the unit's action for the enemy phase.
    fn decide_action(&mut self, ctx: &mut DecisionContext<'_>);

    /// Movement pass: stage a move. It executes before the next unit decides.
    fn decide_move(&mut self, ctx: &mut DecisionContext<'_>);

    /// The unit was pushed. Pending actions can be cancelled and re-aimed.
    fn on_displaced(&mut self, _ctx: &mut DecisionContext<'_>) {}
}

/// What a behavior can see and do while deciding.
///
/// Reads go through [`world`](Self::world); the only mutations available
/// are submitting and cancelling actions and the scoped bake helpers, which
/// always leave the standard bake in place.
pub struct DecisionContext<'a> {
    world: &'a mut World,
    scheduler: &'a mut TurnScheduler<Action>,
    rng: &'a mut DeterministicRng,
    unit: UnitId,
}

impl<'a> DecisionContext<'a> {
    /// Context for `unit`.
    pub fn new(
        world: &'a mut World,
        scheduler: &'a mut TurnScheduler<Action>,
        rng: &'a mut DeterministicRng,
        unit: UnitId,
    ) -> Self {
        Self {
            world,
            scheduler,
            rng,
            unit,
        }
    }

    /// The deciding unit's id.
    #[must_use]
    pub fn unit_id(&self) -> UnitId {
        self.unit
    }

    /// Read-only world.
    #[must_use]
    pub fn world(&self) -> &World {
        &*self.world
    }

    /// Read-only grid.
    #[must_use]
    pub fn grid(&self) -> &SpatialIndex {
        self.world.grid()
    }

    /// The deciding unit.
    #[must_use]
    pub fn me(&self) -> Option<&Unit> {
        self.world.unit(self.unit)
    }

    /// The player unit, if alive.
    #[must_use]
    pub fn player(&self) -> Option<&Unit> {
        self.world.player_id().and_then(|id| self.world.unit(id))
    }

    /// Shared battle randomness.
    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut *self.rng
    }

    /// Stage an action at the unit's priority.
    pub fn submit(&mut self, action: Action) -> ActionId {
        let priority = self.me().map_or(0, |u| u.priority);
        let kind = action.kind();
        let targets = action.targets(&*self.world);
        let id = self.scheduler.submit(self.unit, action, priority);
        debug!(unit = self.unit, action = id, %kind, "action submitted");
        self.world.emit(BattleEvent::ActionSubmitted {
            unit: self.unit,
            action: id,
            kind,
            targets,
        });
        id
    }

    /// Withdraw an action that has not started. Returns whether it was pending.
    pub fn cancel(&mut self, id: ActionId) -> bool {
        if self.scheduler.cancel(id).is_none() {
            return false;
        }
        self.world.emit(BattleEvent::ActionCancelled {
            unit: self.unit,
            action: id,
        });
        true
    }

    /// Path length between two units, neither blocking the other.
    pub fn distance_between_units(&mut self, a: UnitId, b: UnitId) -> Distance {
        self.world.distance_between_units(a, b)
    }

    /// Path that avoids hazards when possible.
    pub fn path_avoiding_hazards(&mut self, from: Cell, to: Cell) -> Option<Vec<Cell>> {
        self.world.path_avoiding_hazards(from, to)
    }

    /// Run `f` against a bake that treats `cells` as passable.
    pub fn with_ignored<R>(&mut self, cells: &BTreeSet<Cell>, f: impl FnOnce(&SpatialIndex) -> R) -> R {
        self.world.with_ignored(cells, f)
    }
}

/// A unit produced by a [`UnitFactory`].
pub struct SpawnedUnit {
    /// Stats of the new unit.
    pub params: UnitSpawnParams,
    /// Decision logic, for hostiles.
    pub behavior: Option<Box<dyn HostileBehavior>>,
}

/// Builds units from template ids for [`Action::SpawnUnit`].
pub trait UnitFactory {
    /// `None` if the template is unknown.
    fn spawn(&mut self, template: &str, cell: Cell) -> Option<SpawnedUnit>;
}

/// Factory that knows no templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFactory;

impl UnitFactory for NullFactory {
    fn spawn(&mut self, _template: &str, _cell: Cell) -> Option<SpawnedUnit> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BattleConfig;
    use crate::navmesh::GroundSource;

    #[test]
    fn test_submit_uses_unit_priority_and_emits() {
        let mut world = World::new(&GroundSource::rectangle(3, 3), BattleConfig::default());
        let id = world
            .spawn_unit(&UnitSpawnParams::hostile("grunt", 1, 7), Cell::new(0, 0))
            .unwrap();
        world.take_events();
        let mut scheduler = TurnScheduler::new();
        let mut rng = DeterministicRng::new(1);

        let mut ctx = DecisionContext::new(&mut world, &mut scheduler, &mut rng, id);
        let action = ctx.submit(Action::SingleDamage {
            cell: Cell::new(1, 0),
            amount: 1,
        });
        assert!(ctx.cancel(action));
        assert!(!ctx.cancel(action));

        let events = world.take_events();
        assert!(matches!(
            events.as_slice(),
            [
                BattleEvent::ActionSubmitted { unit, targets, .. },
                BattleEvent::ActionCancelled { .. }
            ] if *unit == id && targets == &vec![Cell::new(1, 0)]
        ));
    }

    #[test]
    fn test_null_factory() {
        assert!(NullFactory.spawn("anything", Cell::new(0, 0)).is_none());
    }
}
