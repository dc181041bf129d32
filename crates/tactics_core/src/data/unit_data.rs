//! Unit templates for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use crate::data::BattleConfig;
use crate::error::Result;
use crate::hazards::{HazardKind, HazardSpec};
use crate::units::{Faction, Health, UnitSpawnParams};

/// Tuning numbers for a unit's behavior.
///
/// Behaviors read only the fields they need; the rest keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackData {
    /// Damage per hit.
    pub damage: u32,
    /// Maximum reach in tiles.
    pub range: u32,
    /// Area radius for area attacks.
    pub radius: u32,
    /// Push distance applied on hit.
    pub knockback: u32,
    /// Rounds between uses.
    pub cooldown: u32,
    /// Duration of created hazards or applied statuses.
    pub duration: u32,
    /// Hazard left by area attacks.
    pub hazard: Option<HazardKind>,
}

impl Default for AttackData {
    fn default() -> Self {
        Self {
            damage: 1,
            range: 1,
            radius: 1,
            knockback: 0,
            cooldown: 0,
            duration: 2,
            hazard: None,
        }
    }
}

/// A template with a relative selection weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTemplate {
    /// Template id.
    pub template: String,
    /// Relative weight; zero is never picked.
    pub weight: u32,
}

/// Data-driven unit template.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "grenadier",
///     health: Some(3),
///     movement: 2,
///     priority: 4,
///     behavior: Some("grenadier"),
///     attack: (range: 5, hazard: Some(Poison), duration: 2),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique template id.
    pub id: String,

    /// Side the unit fights for.
    #[serde(default = "default_faction")]
    pub faction: Faction,

    /// Maximum health; `None` makes the unit indestructible.
    #[serde(default)]
    pub health: Option<u32>,

    /// Starting health if lower than the maximum.
    #[serde(default)]
    pub starting_health: Option<u32>,

    /// Tiles per move decision.
    #[serde(default = "default_movement")]
    pub movement: u32,

    /// Action ordering key; lower acts first.
    #[serde(default)]
    pub priority: i32,

    /// Whether push actions affect the unit.
    #[serde(default = "default_true")]
    pub pushable: bool,

    /// Whether status effects can be attached.
    #[serde(default = "default_true")]
    pub accepts_status: bool,

    /// Behavior name, resolved by the runner.
    #[serde(default)]
    pub behavior: Option<String>,

    /// Behavior tuning.
    #[serde(default)]
    pub attack: AttackData,

    /// Templates a spawner may produce.
    #[serde(default)]
    pub spawns: Vec<WeightedTemplate>,

    /// Hazard left behind on death.
    #[serde(default)]
    pub on_death_hazard: Option<HazardSpec>,
}

const fn default_faction() -> Faction {
    Faction::Hostile
}

const fn default_movement() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

impl UnitData {
    /// Parse a single template from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        super::parse_ron("UnitData", source)
    }

    /// Parse a list of templates from RON.
    pub fn list_from_ron_str(source: &str) -> Result<Vec<Self>> {
        super::parse_ron("Vec<UnitData>", source)
    }

    /// Spawn parameters for this template. Player templates get the
    /// configured action point budget.
    #[must_use]
    pub fn to_spawn_params(&self, config: &BattleConfig) -> UnitSpawnParams {
        let health = self.health.map(|max| match self.starting_health {
            Some(start) => Health::with_current(max, start),
            None => Health::new(max),
        });
        let action_points = (self.faction == Faction::Player).then(|| config.player_budget());

        UnitSpawnParams {
            template: self.id.clone(),
            faction: self.faction,
            health,
            movement: self.movement,
            priority: self.priority,
            pushable: self.pushable,
            accepts_status: self.accepts_status,
            action_points,
            on_death_hazard: self.on_death_hazard,
        }
    }
}
