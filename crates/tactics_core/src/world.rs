//! The simulation context: spatial index, units, hazards and their rules.
//!
//! [`World`] is the only place where units take damage, move, die, or gain
//! statuses, so every effect follows the same rules no matter which action
//! or hook caused it. It records what happened as [`BattleEvent`]s and keeps
//! a list of deaths and displacements for the battle to react to.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use tracing::{debug, warn};

use crate::cell::Cell;
use crate::data::{BattleConfig, MapData};
use crate::error::{GameError, Result};
use crate::events::BattleEvent;
use crate::grid::{Distance, SpatialIndex};
use crate::hazards::{Hazard, HazardId, HazardKind, HazardSpec};
use crate::math::Vec2Fixed;
use crate::navmesh::GroundSource;
use crate::status::{StatusEffect, StatusTick};
use crate::units::{Faction, Unit, UnitId, UnitSpawnParams};

/// Units, hazards and the grid they live on.
#[derive(Debug, Clone)]
pub struct World {
    grid: SpatialIndex,
    units: BTreeMap<UnitId, Unit>,
    hazards: BTreeMap<HazardId, Hazard>,
    config: BattleConfig,
    next_unit_id: UnitId,
    next_hazard_id: HazardId,
    events: Vec<BattleEvent>,
    deaths: Vec<UnitId>,
    displaced: Vec<UnitId>,
}

impl World {
    /// Empty world over the given terrain.
    #[must_use]
    pub fn new(source: &GroundSource, config: BattleConfig) -> Self {
        Self {
            grid: SpatialIndex::new(source, config.tile_size),
            units: BTreeMap::new(),
            hazards: BTreeMap::new(),
            config,
            next_unit_id: 1,
            next_hazard_id: 1,
            events: Vec::new(),
            deaths: Vec::new(),
            displaced: Vec::new(),
        }
    }

    /// Empty world over a text map.
    pub fn from_map(map: &MapData, config: BattleConfig) -> Result<Self> {
        Ok(Self::new(&map.to_ground_source()?, config))
    }

    /// Spatial index (read-only).
    #[must_use]
    pub fn grid(&self) -> &SpatialIndex {
        &self.grid
    }

    /// Battle tuning.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    /// Place a new unit on a free cell.
    pub fn spawn_unit(&mut self, params: &UnitSpawnParams, cell: Cell) -> Result<UnitId> {
        let id = self.next_unit_id;
        self.grid.register_unit(id, cell)?;
        self.next_unit_id += 1;

        let unit = Unit::from_params(id, cell, self.grid.world_position(cell), params);
        debug!(unit = id, template = %unit.template, %cell, faction = %unit.faction, "unit spawned");
        self.events.push(BattleEvent::UnitSpawned {
            unit: id,
            template: unit.template.clone(),
            cell,
        });
        self.units.insert(id, unit);
        Ok(id)
    }

    /// Take a unit off the map without a death record.
    pub fn remove_unit(&mut self, id: UnitId) -> Option<Unit> {
        let unit = self.units.remove(&id)?;
        self.grid.unregister_unit(id);
        Some(unit)
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// True if the unit is on the map.
    #[must_use]
    pub fn is_alive(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    /// All units in id order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.units.values()
    }

    /// Unit standing on `cell`.
    #[must_use]
    pub fn unit_at(&self, cell: Cell) -> Option<&Unit> {
        self.grid.unit_at(cell).and_then(|id| self.units.get(&id))
    }

    /// The player-controlled unit, if alive.
    #[must_use]
    pub fn player_id(&self) -> Option<UnitId> {
        self.units
            .values()
            .find(|u| u.faction == Faction::Player)
            .map(|u| u.id)
    }

    /// Number of player-faction units.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.units
            .values()
            .filter(|u| u.faction == Faction::Player)
            .count()
    }

    /// Hostile units, lowest priority first, ties by id.
    #[must_use]
    pub fn hostiles_by_priority(&self) -> Vec<UnitId> {
        let mut hostiles: Vec<&Unit> = self
            .units
            .values()
            .filter(|u| u.faction == Faction::Hostile)
            .collect();
        hostiles.sort_by_key(|u| u.priority);
        hostiles.into_iter().map(|u| u.id).collect()
    }

    /// Set a unit's interpolated position without touching the registry.
    pub(crate) fn set_world_position(&mut self, id: UnitId, position: Vec2Fixed) {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.world_position = position;
        }
    }

    /// Put every unit back on its registered cell.
    pub(crate) fn snap_to_cells(&mut self) {
        for unit in self.units.values_mut() {
            unit.world_position = self.grid.world_position(unit.cell);
        }
    }

    /// Move a unit's registration to `cell` and snap it there.
    pub fn relocate_unit(&mut self, id: UnitId, cell: Cell) -> Result<()> {
        let from = self.grid.unit_cell(id).ok_or(GameError::UnitNotFound(id))?;
        self.grid.update_unit_position(id, cell)?;

        let world_position = self.grid.world_position(cell);
        if let Some(unit) = self.units.get_mut(&id) {
            unit.cell = cell;
            unit.world_position = world_position;
        }
        if from != cell {
            self.events.push(BattleEvent::UnitMoved { unit: id, from, to: cell });
        }
        Ok(())
    }

    /// Start-of-turn refill for units with an action budget.
    pub fn restore_action_points(&mut self, id: UnitId) {
        if let Some(ap) = self.units.get_mut(&id).and_then(|u| u.action_points.as_mut()) {
            ap.restore();
        }
    }

    /// Spend action points, or fail without spending any.
    pub fn spend_action_points(&mut self, id: UnitId, amount: u32) -> Result<()> {
        let unit = self.units.get_mut(&id).ok_or(GameError::UnitNotFound(id))?;
        let Some(ap) = unit.action_points.as_mut() else {
            return Err(GameError::InsufficientActionPoints {
                required: amount,
                available: 0,
            });
        };
        if ap.spend(amount) {
            Ok(())
        } else {
            Err(GameError::InsufficientActionPoints {
                required: amount,
                available: ap.total(),
            })
        }
    }

    /// Record that a unit was moved against its will.
    pub(crate) fn mark_displaced(&mut self, id: UnitId) {
        if !self.displaced.contains(&id) {
            self.displaced.push(id);
        }
    }

    // ------------------------------------------------------------------
    // Damage
    // ------------------------------------------------------------------

    /// Damage a unit. Returns the effective health lost by whoever took it.
    ///
    /// A live protector takes the hit instead; indestructible units ignore
    /// damage; a unit reaching zero health dies.
    pub fn damage_unit(&mut self, id: UnitId, amount: u32) -> u32 {
        if amount == 0 {
            return 0;
        }
        let Some(unit) = self.units.get(&id) else {
            debug!(unit = id, "damage to missing unit ignored");
            return 0;
        };

        if let Some(protector) = unit.protector() {
            if protector != id && self.is_alive(protector) {
                self.events.push(BattleEvent::DamageRedirected { from: id, to: protector });
                return self.apply_damage(protector, amount);
            }
        }
        self.apply_damage(id, amount)
    }

    fn apply_damage(&mut self, id: UnitId, amount: u32) -> u32 {
        let Some(health) = self.units.get_mut(&id).and_then(|u| u.health.as_mut()) else {
            return 0;
        };

        let lost = health.apply_damage(amount);
        let remaining = health.current;
        let dead = health.is_dead();
        debug!(unit = id, amount, lost, remaining, "unit damaged");
        self.events.push(BattleEvent::UnitDamaged {
            unit: id,
            amount: lost,
            remaining,
        });

        if dead {
            self.kill(id);
        }
        lost
    }

    /// Damage whatever stands on `cell`. Returns the unit hit, if any.
    pub fn damage_at(&mut self, cell: Cell, amount: u32) -> Option<UnitId> {
        let Some(target) = self.grid.unit_at(cell) else {
            debug!(%cell, amount, "no target at cell");
            return None;
        };
        self.damage_unit(target, amount);
        Some(target)
    }

    fn kill(&mut self, id: UnitId) {
        let Some(unit) = self.units.remove(&id) else {
            return;
        };
        self.grid.unregister_unit(id);
        debug!(unit = id, cell = %unit.cell, "unit died");
        self.events.push(BattleEvent::UnitDied { unit: id, cell: unit.cell });
        self.deaths.push(id);

        if let Some(spec) = unit.on_death_hazard {
            if let Err(err) = self.create_hazard(spec, unit.cell) {
                warn!(unit = id, %err, "on-death hazard not created");
            }
        }
    }

    // ------------------------------------------------------------------
    // Hazards
    // ------------------------------------------------------------------

    /// Look up a hazard.
    #[must_use]
    pub fn hazard(&self, id: HazardId) -> Option<&Hazard> {
        self.hazards.get(&id)
    }

    /// All hazards in id order.
    pub fn hazards(&self) -> impl Iterator<Item = &Hazard> + '_ {
        self.hazards.values()
    }

    /// Place a hazard and apply it to a unit already on the cell.
    pub fn create_hazard(&mut self, spec: HazardSpec, cell: Cell) -> Result<HazardId> {
        let id = self.next_hazard_id;
        self.grid.register_hazard(id, cell)?;
        self.next_hazard_id += 1;

        self.hazards.insert(id, Hazard::new(id, spec, cell));
        debug!(hazard = id, kind = %spec.kind, %cell, "hazard created");
        self.events.push(BattleEvent::HazardCreated {
            hazard: id,
            kind: spec.kind,
            cell,
        });

        if let Some(unit) = self.grid.unit_at(cell) {
            self.apply_hazard(id, unit);
        }
        Ok(id)
    }

    /// Apply one hazard's effect to one unit.
    pub fn apply_hazard(&mut self, hazard: HazardId, unit: UnitId) {
        let Some(kind) = self.hazards.get(&hazard).map(|h| h.kind) else {
            return;
        };
        match kind {
            HazardKind::Laser => {
                self.damage_unit(unit, self.config.laser_damage);
            }
            HazardKind::Fire => {
                let effect = StatusEffect::Burning {
                    damage: self.config.fire_damage,
                    remaining: self.config.fire_duration,
                };
                self.add_status(unit, effect);
            }
            HazardKind::Poison => {
                let effect = StatusEffect::Poisoned {
                    damage: self.config.poison_damage,
                    remaining: self.config.poison_duration,
                };
                self.add_status(unit, effect);
            }
        }
    }

    /// Apply every hazard on `cell` to `unit`, in hazard id order.
    pub fn apply_hazards_at(&mut self, unit: UnitId, cell: Cell) {
        for hazard in self.grid.hazards_at(cell) {
            if !self.is_alive(unit) {
                break;
            }
            self.apply_hazard(hazard, unit);
        }
    }

    /// Age every hazard by one round and remove the expired ones.
    pub fn tick_hazards(&mut self) {
        let mut expired = Vec::new();
        for hazard in self.hazards.values_mut() {
            if hazard.tick() {
                expired.push((hazard.id, hazard.cell));
            }
        }
        for (id, cell) in expired {
            self.hazards.remove(&id);
            self.grid.unregister_hazard(id);
            debug!(hazard = id, %cell, "hazard expired");
            self.events.push(BattleEvent::HazardExpired { hazard: id, cell });
        }
    }

    // ------------------------------------------------------------------
    // Status effects
    // ------------------------------------------------------------------

    /// Attach a status effect. Returns false if the unit is missing or
    /// refuses statuses.
    pub fn add_status(&mut self, id: UnitId, effect: StatusEffect) -> bool {
        let Some(unit) = self.units.get_mut(&id) else {
            return false;
        };
        if !unit.accepts_status {
            debug!(unit = id, kind = ?effect.kind(), "status rejected");
            return false;
        }

        if let (Some(amount), Some(health)) = (effect.shield_on_add(), unit.health.as_mut()) {
            health.set_shield(amount);
        }
        if !effect.is_instant() {
            unit.statuses.push(effect);
        }
        debug!(unit = id, kind = ?effect.kind(), "status applied");
        self.events.push(BattleEvent::StatusApplied {
            unit: id,
            kind: effect.kind(),
        });
        true
    }

    fn on_status_removed(&mut self, id: UnitId, effect: StatusEffect) {
        if effect.clears_shield_on_remove() {
            if let Some(health) = self.units.get_mut(&id).and_then(|u| u.health.as_mut()) {
                health.set_shield(0);
            }
        }
        self.events.push(BattleEvent::StatusExpired {
            unit: id,
            kind: effect.kind(),
        });
    }

    /// Run turn-start hooks of every attached effect.
    pub fn run_turn_start(&mut self, id: UnitId) {
        self.run_status_hook(id, StatusEffect::on_turn_start);
    }

    /// Run turn-end hooks of every attached effect.
    pub fn run_turn_end(&mut self, id: UnitId) {
        self.run_status_hook(id, StatusEffect::on_turn_end);
    }

    fn run_status_hook(&mut self, id: UnitId, hook: fn(&mut StatusEffect) -> StatusTick) {
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };

        let mut statuses = std::mem::take(&mut unit.statuses);
        let mut damage = Vec::new();
        let mut expired = Vec::new();
        statuses.retain_mut(|effect| {
            let tick = hook(effect);
            if tick.damage > 0 {
                damage.push(tick.damage);
            }
            if tick.expired {
                expired.push(*effect);
            }
            !tick.expired
        });
        unit.statuses = statuses;

        for effect in expired {
            self.on_status_removed(id, effect);
        }
        for amount in damage {
            if !self.is_alive(id) {
                break;
            }
            self.damage_unit(id, amount);
        }
    }

    // ------------------------------------------------------------------
    // Grid helpers that need a temporary bake
    // ------------------------------------------------------------------

    /// Path length between two units with neither one blocking the other.
    pub fn distance_between_units(&mut self, a: UnitId, b: UnitId) -> Distance {
        self.grid.distance_between_units(a, b)
    }

    /// Path preferring hazard-free cells. See [`SpatialIndex::path_avoiding_hazards`].
    pub fn path_avoiding_hazards(&mut self, from: Cell, to: Cell) -> Option<Vec<Cell>> {
        self.grid.path_avoiding_hazards(from, to)
    }

    /// Run `f` with `cells` treated as passable, then restore the standard bake.
    pub fn with_ignored<R>(&mut self, cells: &BTreeSet<Cell>, f: impl FnOnce(&SpatialIndex) -> R) -> R {
        self.grid.with_ignored(cells, f)
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    /// Record an event produced outside the world.
    pub(crate) fn emit(&mut self, event: BattleEvent) {
        self.events.push(event);
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<BattleEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain units that died since the last call.
    pub fn take_deaths(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.deaths)
    }

    /// Drain units that were displaced since the last call.
    pub fn take_displaced(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut self.displaced)
    }

    /// Hash of units, hazards and occupancy, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for unit in self.units.values() {
            unit.hash(&mut hasher);
        }
        for hazard in self.hazards.values() {
            hazard.hash(&mut hasher);
        }
        for (id, cell) in self.grid.units() {
            id.hash(&mut hasher);
            cell.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;
    use crate::units::Health;

    fn world(width: i32, height: i32) -> World {
        World::new(&GroundSource::rectangle(width, height), BattleConfig::default())
    }

    fn hostile(health: u32) -> UnitSpawnParams {
        UnitSpawnParams::hostile("grunt", health, 0)
    }

    #[test]
    fn test_spawn_and_lookup() {
        let mut world = world(4, 4);
        let id = world.spawn_unit(&hostile(3), Cell::new(1, 1)).unwrap();
        assert_eq!(world.unit_at(Cell::new(1, 1)).map(|u| u.id), Some(id));
        assert!(!world.grid().is_free(Cell::new(1, 1)));
        assert!(world.spawn_unit(&hostile(3), Cell::new(1, 1)).is_err());
    }

    #[test]
    fn test_death_unregisters_and_records() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(2), Cell::new(0, 0)).unwrap();
        world.take_events();

        assert_eq!(world.damage_unit(id, 5), 2);
        assert!(!world.is_alive(id));
        assert!(world.grid().is_free(Cell::new(0, 0)));
        assert_eq!(world.take_deaths(), vec![id]);
        assert!(world
            .take_events()
            .iter()
            .any(|e| matches!(e, BattleEvent::UnitDied { unit, .. } if *unit == id)));
    }

    #[test]
    fn test_indestructible_ignores_damage() {
        let mut world = world(3, 3);
        let wall = world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(1, 1)).unwrap();
        assert_eq!(world.damage_unit(wall, 100), 0);
        assert!(world.is_alive(wall));
    }

    #[test]
    fn test_protector_takes_damage() {
        let mut world = world(4, 1);
        let ward = world.spawn_unit(&hostile(3), Cell::new(0, 0)).unwrap();
        let guard = world.spawn_unit(&hostile(5), Cell::new(1, 0)).unwrap();
        assert!(world.add_status(
            ward,
            StatusEffect::Protected {
                protector: guard,
                remaining: 2
            }
        ));

        world.damage_unit(ward, 2);
        assert_eq!(world.unit(ward).and_then(|u| u.health).map(|h| h.current), Some(3));
        assert_eq!(world.unit(guard).and_then(|u| u.health).map(|h| h.current), Some(3));

        world.damage_unit(guard, 10);
        assert!(!world.is_alive(guard));
        world.damage_unit(ward, 1);
        assert_eq!(world.unit(ward).and_then(|u| u.health).map(|h| h.current), Some(2));
    }

    #[test]
    fn test_on_death_hazard() {
        let mut world = world(3, 3);
        let params = UnitSpawnParams {
            on_death_hazard: Some(HazardSpec {
                kind: HazardKind::Fire,
                duration: Some(2),
            }),
            ..hostile(1)
        };
        let barrel = world.spawn_unit(&params, Cell::new(2, 2)).unwrap();
        world.damage_unit(barrel, 1);
        assert_eq!(world.grid().hazards_at(Cell::new(2, 2)).len(), 1);
    }

    #[test]
    fn test_hazard_applies_to_occupant_on_creation() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(3), Cell::new(1, 1)).unwrap();
        world
            .create_hazard(
                HazardSpec {
                    kind: HazardKind::Poison,
                    duration: Some(2),
                },
                Cell::new(1, 1),
            )
            .unwrap();
        assert!(world.unit(id).is_some_and(|u| u.has_status(StatusKind::Poisoned)));

        world
            .create_hazard(
                HazardSpec {
                    kind: HazardKind::Laser,
                    duration: None,
                },
                Cell::new(1, 1),
            )
            .unwrap();
        assert_eq!(world.unit(id).and_then(|u| u.health).map(|h| h.current), Some(2));
    }

    #[test]
    fn test_tick_hazards_removes_expired() {
        let mut world = world(3, 3);
        let spec = HazardSpec {
            kind: HazardKind::Fire,
            duration: Some(1),
        };
        let id = world.create_hazard(spec, Cell::new(0, 0)).unwrap();
        world.tick_hazards();
        assert!(world.hazard(id).is_none());
        assert!(world.grid().hazard_at(Cell::new(0, 0)).is_none());
    }

    #[test]
    fn test_status_hooks_damage_and_expire() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(5), Cell::new(0, 0)).unwrap();
        world.add_status(
            id,
            StatusEffect::Burning {
                damage: 2,
                remaining: 1,
            },
        );
        world.run_turn_end(id);
        assert_eq!(world.unit(id).and_then(|u| u.health).map(|h| h.current), Some(5));
        world.run_turn_start(id);
        assert_eq!(world.unit(id).and_then(|u| u.health).map(|h| h.current), Some(3));
        assert!(world.unit(id).is_some_and(|u| u.statuses.is_empty()));
    }

    #[test]
    fn test_temporary_shield_cleared_on_expiry() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(5), Cell::new(0, 0)).unwrap();
        world.add_status(
            id,
            StatusEffect::TemporaryShield {
                amount: 2,
                remaining: 0,
            },
        );
        assert_eq!(world.unit(id).and_then(|u| u.health).map(|h| h.shield), Some(2));
        world.run_turn_end(id);
        assert_eq!(world.unit(id).and_then(|u| u.health).map(|h| h.shield), Some(0));
    }

    #[test]
    fn test_shield_status_is_not_stored() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(5), Cell::new(0, 0)).unwrap();
        world.add_status(id, StatusEffect::Shield { amount: 4 });
        let unit = world.unit(id).unwrap();
        assert!(unit.statuses.is_empty());
        assert_eq!(unit.health, Some(Health { current: 5, max: 5, shield: 4 }));
    }

    #[test]
    fn test_status_rejected_by_props() {
        let mut world = world(3, 3);
        let wall = world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(0, 0)).unwrap();
        assert!(!world.add_status(wall, StatusEffect::Slowed { remaining: 2 }));
    }

    #[test]
    fn test_relocate_updates_everything() {
        let mut world = world(4, 4);
        let id = world.spawn_unit(&hostile(1), Cell::new(0, 0)).unwrap();
        world.relocate_unit(id, Cell::new(3, 3)).unwrap();
        let unit = world.unit(id).unwrap();
        assert_eq!(unit.cell, Cell::new(3, 3));
        assert_eq!(unit.world_position, world.grid().world_position(Cell::new(3, 3)));
        assert!(world.grid().is_free(Cell::new(0, 0)));
    }

    #[test]
    fn test_hostiles_by_priority_stable() {
        let mut world = world(5, 1);
        let a = world.spawn_unit(&UnitSpawnParams::hostile("a", 1, 2), Cell::new(0, 0)).unwrap();
        let b = world.spawn_unit(&UnitSpawnParams::hostile("b", 1, 1), Cell::new(1, 0)).unwrap();
        let c = world.spawn_unit(&UnitSpawnParams::hostile("c", 1, 2), Cell::new(2, 0)).unwrap();
        world.spawn_unit(&UnitSpawnParams::wall(), Cell::new(3, 0)).unwrap();
        assert_eq!(world.hostiles_by_priority(), vec![b, a, c]);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut world = world(3, 3);
        let id = world.spawn_unit(&hostile(3), Cell::new(0, 0)).unwrap();
        let before = world.state_hash();
        assert_eq!(before, world.clone().state_hash());
        world.damage_unit(id, 1);
        assert_ne!(before, world.state_hash());
    }
}
