//! Actions: every effect a unit can have on the battle.
//!
//! An [`Action`] is plain data captured when a unit decides what to do.
//! Execution happens later, step by step, through
//! [`ActionTask`](crate::execution::ActionTask). Targets are resolved at
//! execution time, so an action whose target has moved or died simply does
//! nothing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cell::{Cell, Direction};
use crate::hazards::HazardSpec;
use crate::math::{fixed_serde, Fixed};
use crate::status::StatusEffect;
use crate::units::UnitId;
use crate::world::World;

/// One hit of an area attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageHit {
    /// Target cell.
    pub cell: Cell,
    /// Damage dealt to the occupant.
    pub amount: u32,
}

/// A unit of work in the turn queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Walk through `waypoints` in order, interpolating between cells.
    Move {
        /// Unit moving.
        unit: UnitId,
        /// Cells to visit, start excluded.
        waypoints: Vec<Cell>,
        /// Tiles per simulation step.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
    },
    /// Teleport to a cell.
    InstantMove {
        /// Unit moving.
        unit: UnitId,
        /// Destination.
        cell: Cell,
    },
    /// Run in a straight line; whatever stops the charge is hit and pushed.
    ChargeMove {
        /// Charging unit.
        unit: UnitId,
        /// Direction of travel.
        direction: Direction,
        /// Maximum tiles travelled.
        range: u32,
        /// Damage to the unit that stops the charge.
        damage: u32,
        /// Push distance applied to that unit.
        knockback: u32,
        /// Tiles per simulation step.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
    },
    /// Damage the occupant of one cell.
    SingleDamage {
        /// Target cell.
        cell: Cell,
        /// Damage dealt.
        amount: u32,
    },
    /// Several single hits resolved in order.
    AreaDamage {
        /// Hits in resolution order.
        hits: Vec<DamageHit>,
    },
    /// Shove the occupant of a cell. Distance that cannot be travelled is
    /// dealt as damage.
    Push {
        /// Cell of the unit to push.
        cell: Cell,
        /// Push direction.
        direction: Direction,
        /// Requested distance in tiles.
        distance: u32,
        /// Tiles per simulation step.
        #[serde(with = "fixed_serde")]
        speed: Fixed,
    },
    /// Attach a status effect to the occupant of a cell.
    ApplyStatus {
        /// Target cell.
        cell: Cell,
        /// Effect attached.
        effect: StatusEffect,
    },
    /// Place hazards. A cell qualifies if it is free or holds a unit.
    CreateHazard {
        /// Cells, placed one per step.
        cells: Vec<Cell>,
        /// Hazard placed on each cell.
        spec: HazardSpec,
    },
    /// Ask the unit factory for a new unit.
    SpawnUnit {
        /// Template id.
        template: String,
        /// Cell for the new unit.
        cell: Cell,
    },
    /// Fire along a rasterized line; the first unit on the line is hit.
    TargetedLineShot {
        /// Shooter.
        sender: UnitId,
        /// Unit aimed at.
        target: UnitId,
        /// Damage dealt.
        damage: u32,
    },
}

/// Payload-free tag for [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    /// See [`Action::Move`].
    Move,
    /// See [`Action::InstantMove`].
    InstantMove,
    /// See [`Action::ChargeMove`].
    ChargeMove,
    /// See [`Action::SingleDamage`].
    SingleDamage,
    /// See [`Action::AreaDamage`].
    AreaDamage,
    /// See [`Action::Push`].
    Push,
    /// See [`Action::ApplyStatus`].
    ApplyStatus,
    /// See [`Action::CreateHazard`].
    CreateHazard,
    /// See [`Action::SpawnUnit`].
    SpawnUnit,
    /// See [`Action::TargetedLineShot`].
    TargetedLineShot,
}

/// How a presentation layer should read an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intention {
    /// Hurts whatever is at the targets.
    Attack,
    /// Changes a unit's state without direct damage.
    Buff,
    /// Relocates the acting unit.
    Move,
    /// Anything else.
    Other,
}

impl ActionKind {
    /// Presentation category.
    #[must_use]
    pub const fn intention(self) -> Intention {
        match self {
            Self::Move | Self::InstantMove => Intention::Move,
            Self::ChargeMove
            | Self::SingleDamage
            | Self::AreaDamage
            | Self::Push
            | Self::CreateHazard
            | Self::TargetedLineShot => Intention::Attack,
            Self::ApplyStatus => Intention::Buff,
            Self::SpawnUnit => Intention::Other,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::InstantMove => "instant move",
            Self::ChargeMove => "charge",
            Self::SingleDamage => "single damage",
            Self::AreaDamage => "area damage",
            Self::Push => "push",
            Self::ApplyStatus => "apply status",
            Self::CreateHazard => "create hazard",
            Self::SpawnUnit => "spawn unit",
            Self::TargetedLineShot => "targeted shot",
        };
        f.write_str(name)
    }
}

impl Action {
    /// Area damage with the same amount on every cell.
    #[must_use]
    pub fn area_damage(cells: impl IntoIterator<Item = Cell>, amount: u32) -> Self {
        Self::AreaDamage {
            hits: cells
                .into_iter()
                .map(|cell| DamageHit { cell, amount })
                .collect(),
        }
    }

    /// Tag of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::InstantMove { .. } => ActionKind::InstantMove,
            Self::ChargeMove { .. } => ActionKind::ChargeMove,
            Self::SingleDamage { .. } => ActionKind::SingleDamage,
            Self::AreaDamage { .. } => ActionKind::AreaDamage,
            Self::Push { .. } => ActionKind::Push,
            Self::ApplyStatus { .. } => ActionKind::ApplyStatus,
            Self::CreateHazard { .. } => ActionKind::CreateHazard,
            Self::SpawnUnit { .. } => ActionKind::SpawnUnit,
            Self::TargetedLineShot { .. } => ActionKind::TargetedLineShot,
        }
    }

    /// Shorthand for `self.kind().intention()`.
    #[must_use]
    pub const fn intention(&self) -> Intention {
        self.kind().intention()
    }

    /// The unit that carries out the action, for self-moving variants.
    #[must_use]
    pub const fn actor(&self) -> Option<UnitId> {
        match self {
            Self::Move { unit, .. }
            | Self::InstantMove { unit, .. }
            | Self::ChargeMove { unit, .. } => Some(*unit),
            Self::TargetedLineShot { sender, .. } => Some(*sender),
            _ => None,
        }
    }

    /// Cells the action is expected to affect, as of `world`'s current state.
    ///
    /// Meant for highlighting. Execution resolves targets again, so the
    /// answer can go stale once other actions run.
    #[must_use]
    pub fn targets(&self, world: &World) -> Vec<Cell> {
        match self {
            Self::Move { waypoints, .. } => waypoints.last().copied().into_iter().collect(),
            Self::InstantMove { cell, .. }
            | Self::SingleDamage { cell, .. }
            | Self::ApplyStatus { cell, .. }
            | Self::SpawnUnit { cell, .. } => vec![*cell],
            Self::AreaDamage { hits } => hits.iter().map(|hit| hit.cell).collect(),
            Self::CreateHazard { cells, .. } => cells.clone(),
            Self::Push {
                cell,
                direction,
                distance,
                ..
            } => {
                let mut cells = vec![*cell];
                let mut current = *cell;
                for _ in 0..*distance {
                    current = current.step(*direction);
                    if !world.grid().in_bounds(current) {
                        break;
                    }
                    cells.push(current);
                }
                cells
            }
            Self::ChargeMove {
                unit,
                direction,
                range,
                ..
            } => {
                let Some(start) = world.unit(*unit).map(|u| u.cell) else {
                    return Vec::new();
                };
                let mut cells = Vec::new();
                let mut current = start;
                for _ in 0..*range {
                    current = current.step(*direction);
                    if !world.grid().in_bounds(current) {
                        break;
                    }
                    cells.push(current);
                    if !world.grid().is_free(current) {
                        break;
                    }
                }
                cells
            }
            Self::TargetedLineShot { target, .. } => {
                world.unit(*target).map(|u| u.cell).into_iter().collect()
            }
        }
    }
}
