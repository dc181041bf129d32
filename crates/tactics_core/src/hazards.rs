//! Environmental hazards: non-blocking effect sources attached to cells.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cell::Cell;

/// Unique identifier for hazards.
pub type HazardId = u64;

/// What a hazard does to a unit standing in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HazardKind {
    /// Sets the unit on fire.
    Fire,
    /// Poisons the unit.
    Poison,
    /// Deals damage directly.
    Laser,
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fire => "fire",
            Self::Poison => "poison",
            Self::Laser => "laser",
        };
        f.write_str(name)
    }
}

/// Blueprint for a hazard that has not been placed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HazardSpec {
    /// Hazard type.
    pub kind: HazardKind,
    /// Rounds before removal; `None` is permanent.
    #[serde(default)]
    pub duration: Option<u32>,
}

/// A hazard placed on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hazard {
    /// Identifier.
    pub id: HazardId,
    /// Hazard type.
    pub kind: HazardKind,
    /// Cell it covers.
    pub cell: Cell,
    /// Rounds before removal; `None` is permanent.
    pub duration: Option<u32>,
    /// Rounds ticked so far.
    pub rounds_alive: u32,
}

impl Hazard {
    /// Create a fresh hazard.
    #[must_use]
    pub fn new(id: HazardId, spec: HazardSpec, cell: Cell) -> Self {
        Self {
            id,
            kind: spec.kind,
            cell,
            duration: spec.duration,
            rounds_alive: 0,
        }
    }

    /// Advance one round. Returns true once the hazard has expired.
    ///
    /// Permanent hazards never age.
    pub fn tick(&mut self) -> bool {
        let Some(duration) = self.duration else {
            return false;
        };
        self.rounds_alive += 1;
        self.rounds_alive >= duration
    }
}
