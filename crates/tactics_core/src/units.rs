//! Units on the battlefield: health, action points, and spawn parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cell::Cell;
use crate::hazards::HazardSpec;
use crate::math::Vec2Fixed;
use crate::status::{StatusEffect, StatusKind};

/// Unique identifier for units.
pub type UnitId = u64;

/// Which side a unit fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Faction {
    /// The player-controlled actor.
    Player,
    /// Units driven by a [`HostileBehavior`](crate::behavior::HostileBehavior).
    Hostile,
    /// Props: barrels, crates, walls that can be broken.
    Neutral,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Player => "player",
            Self::Hostile => "hostile",
            Self::Neutral => "neutral",
        };
        f.write_str(name)
    }
}

/// Health with an absorbing shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
    /// Shield points, consumed before health.
    pub shield: u32,
}

impl Health {
    /// Full health, no shield.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self {
            current: max,
            max,
            shield: 0,
        }
    }

    /// Custom starting health, clamped to `max`.
    #[must_use]
    pub fn with_current(max: u32, current: u32) -> Self {
        Self {
            current: current.min(max),
            max,
            shield: 0,
        }
    }

    /// Check if dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Health plus shield.
    #[must_use]
    pub const fn effective(&self) -> u32 {
        self.current + self.shield
    }

    /// Apply damage, shield first. Returns effective health lost.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let before = self.effective();
        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        let rest = amount - absorbed;
        self.current = self.current.saturating_sub(rest);
        before - self.effective()
    }

    /// Heal up to max. Returns amount healed.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let headroom = self.max.saturating_sub(self.current);
        let actual = amount.min(headroom);
        self.current += actual;
        actual
    }

    /// Replace the shield value.
    pub fn set_shield(&mut self, amount: u32) {
        self.shield = amount;
    }
}

/// Per-turn action budget with a carry-over pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionPoints {
    /// Points granted each turn.
    pub max: u32,
    /// Points left this turn.
    pub current: u32,
    /// Cap on carried-over points.
    pub pool_size: u32,
    /// Carried-over points.
    pub pooled: u32,
}

impl ActionPoints {
    /// Empty budget. The first [`restore`](Self::restore) fills it.
    #[must_use]
    pub const fn new(max: u32, pool_size: u32) -> Self {
        Self {
            max,
            current: 0,
            pool_size,
            pooled: 0,
        }
    }

    /// Points available this turn, pool included.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.current + self.pooled
    }

    /// Spend from this turn's points first, then the pool.
    ///
    /// Returns false and spends nothing if the total is insufficient.
    pub fn spend(&mut self, amount: u32) -> bool {
        if amount > self.total() {
            return false;
        }
        if self.current >= amount {
            self.current -= amount;
        } else {
            self.pooled -= amount - self.current;
            self.current = 0;
        }
        true
    }

    /// Start of turn: unspent points move to the pool (capped), current refills.
    pub fn restore(&mut self) {
        self.pooled = (self.pooled + self.current).min(self.pool_size);
        self.current = self.max;
    }
}

/// A unit on the battlefield.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Identifier.
    pub id: UnitId,
    /// Template the unit was created from.
    pub template: String,
    /// Side.
    pub faction: Faction,
    /// Registered cell.
    pub cell: Cell,
    /// Interpolated world position. Equals the cell centre when not moving.
    pub world_position: Vec2Fixed,
    /// `None` for indestructible units.
    pub health: Option<Health>,
    /// Tiles per move decision.
    pub movement: u32,
    /// Action ordering key; lower acts first.
    pub priority: i32,
    /// Whether push actions affect the unit.
    pub pushable: bool,
    /// Whether status effects can be attached.
    pub accepts_status: bool,
    /// Attached status effects in application order.
    pub statuses: Vec<StatusEffect>,
    /// Only the player has action points.
    pub action_points: Option<ActionPoints>,
    /// Hazard left behind on death.
    pub on_death_hazard: Option<HazardSpec>,
}

impl Unit {
    /// Build a unit from spawn parameters.
    #[must_use]
    pub fn from_params(id: UnitId, cell: Cell, world_position: Vec2Fixed, params: &UnitSpawnParams) -> Self {
        Self {
            id,
            template: params.template.clone(),
            faction: params.faction,
            cell,
            world_position,
            health: params.health,
            movement: params.movement,
            priority: params.priority,
            pushable: params.pushable,
            accepts_status: params.accepts_status,
            statuses: Vec::new(),
            action_points: params.action_points,
            on_death_hazard: params.on_death_hazard,
        }
    }

    /// True if the unit can take damage and has none left.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health.is_some_and(|h| h.is_dead())
    }

    /// Whether any attached effect has the given kind.
    #[must_use]
    pub fn has_status(&self, kind: StatusKind) -> bool {
        self.statuses.iter().any(|s| s.kind() == kind)
    }

    /// Movement after statuses: Slowed halves it, never below one tile.
    #[must_use]
    pub fn effective_movement(&self) -> u32 {
        if self.has_status(StatusKind::Slowed) {
            (self.movement / 2).max(1)
        } else {
            self.movement
        }
    }

    /// Per-tile move cost for action-point users; Slowed doubles it.
    #[must_use]
    pub fn move_cost_multiplier(&self) -> u32 {
        if self.has_status(StatusKind::Slowed) {
            2
        } else {
            1
        }
    }

    /// Live protector, if a `Protected` effect is attached.
    #[must_use]
    pub fn protector(&self) -> Option<UnitId> {
        self.statuses.iter().find_map(|s| match s {
            StatusEffect::Protected { protector, .. } => Some(*protector),
            _ => None,
        })
    }
}

/// Parameters for spawning a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpawnParams {
    /// Template name.
    pub template: String,
    /// Side.
    pub faction: Faction,
    /// `None` for indestructible units.
    pub health: Option<Health>,
    /// Tiles per move decision.
    pub movement: u32,
    /// Action ordering key.
    pub priority: i32,
    /// Whether push actions affect the unit.
    pub pushable: bool,
    /// Whether status effects can be attached.
    pub accepts_status: bool,
    /// Player action budget.
    pub action_points: Option<ActionPoints>,
    /// Hazard left behind on death.
    pub on_death_hazard: Option<HazardSpec>,
}

impl Default for UnitSpawnParams {
    fn default() -> Self {
        Self {
            template: String::from("unit"),
            faction: Faction::Hostile,
            health: Some(Health::new(3)),
            movement: 3,
            priority: 0,
            pushable: true,
            accepts_status: true,
            action_points: None,
            on_death_hazard: None,
        }
    }
}

impl UnitSpawnParams {
    /// Player defaults with the given budget.
    #[must_use]
    pub fn player(health: u32, action_points: ActionPoints) -> Self {
        Self {
            template: String::from("player"),
            faction: Faction::Player,
            health: Some(Health::new(health)),
            action_points: Some(action_points),
            ..Default::default()
        }
    }

    /// A hostile with the given template, health and priority.
    #[must_use]
    pub fn hostile(template: &str, health: u32, priority: i32) -> Self {
        Self {
            template: template.to_owned(),
            health: Some(Health::new(health)),
            priority,
            ..Default::default()
        }
    }

    /// An indestructible, immovable obstacle unit.
    #[must_use]
    pub fn wall() -> Self {
        Self {
            template: String::from("wall"),
            faction: Faction::Neutral,
            health: None,
            movement: 0,
            pushable: false,
            accepts_status: false,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shield_absorbs_first() {
        let mut health = Health::new(5);
        health.set_shield(2);
        assert_eq!(health.apply_damage(3), 3);
        assert_eq!(health.shield, 0);
        assert_eq!(health.current, 4);
    }

    #[test]
    fn test_damage_saturates() {
        let mut health = Health::with_current(5, 2);
        assert_eq!(health.apply_damage(10), 2);
        assert!(health.is_dead());
        assert_eq!(health.heal(10), 5);
    }

    #[test]
    fn test_action_points_pool() {
        let mut ap = ActionPoints::new(5, 3);
        assert_eq!(ap.total(), 0);
        ap.restore();
        assert_eq!(ap.current, 5);
        assert!(ap.spend(1));
        ap.restore();
        // 4 unspent, pool capped at 3.
        assert_eq!(ap.pooled, 3);
        assert_eq!(ap.total(), 8);

        assert!(ap.spend(7));
        assert_eq!(ap.current, 0);
        assert_eq!(ap.pooled, 1);
        assert!(!ap.spend(2));
        assert_eq!(ap.total(), 1);
    }

    #[test]
    fn test_slowed_movement() {
        let params = UnitSpawnParams {
            movement: 3,
            ..Default::default()
        };
        let mut unit = Unit::from_params(1, Cell::new(0, 0), Vec2Fixed::ZERO, &params);
        assert_eq!(unit.effective_movement(), 3);
        unit.statuses.push(StatusEffect::Slowed { remaining: 1 });
        assert_eq!(unit.effective_movement(), 1);
        assert_eq!(unit.move_cost_multiplier(), 2);

        unit.movement = 1;
        assert_eq!(unit.effective_movement(), 1);
    }

    #[test]
    fn test_indestructible_never_dies() {
        let unit = Unit::from_params(1, Cell::new(0, 0), Vec2Fixed::ZERO, &UnitSpawnParams::wall());
        assert!(!unit.is_dead());
        assert!(unit.health.is_none());
    }
}
