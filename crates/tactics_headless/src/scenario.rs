//! Scenario loading and configuration.
//!
//! Scenarios define the initial battle state for headless testing: the map,
//! battle tuning, unit templates and where units start.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tactics_core::battle::Battle;
use tactics_core::behavior::UnitFactory;
use tactics_core::cell::Cell;
use tactics_core::data::{AttackData, BattleConfig, MapData, UnitData, WeightedTemplate};
use tactics_core::error::GameError;
use tactics_core::hazards::{HazardKind, HazardSpec};
use tactics_core::units::Faction;
use tactics_core::world::World;

use crate::factory::TemplateFactory;
use crate::strategies;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The simulation rejected the scenario.
    #[error("Simulation error: {0}")]
    Game(#[from] GameError),
    /// A placement or spawn table names a template that does not exist.
    #[error("Unknown unit template: {0}")]
    UnknownTemplate(String),
    /// The scenario is structurally wrong.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// A complete scenario configuration.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "Corridor",
///     map: (rows: ["......", ".#....", "......"]),
///     templates: [
///         (id: "hero", faction: Player, health: Some(5)),
///         (id: "grunt", health: Some(2), behavior: Some("melee")),
///     ],
///     placements: [
///         (template: "hero", position: (0, 1)),
///         (template: "grunt", position: (5, 1)),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Map layout.
    pub map: MapData,
    /// Battle tuning.
    #[serde(default)]
    pub config: BattleConfig,
    /// Unit templates by id.
    pub templates: Vec<UnitData>,
    /// Starting units.
    pub placements: Vec<UnitPlacement>,
    /// Rounds played before the game counts as unfinished.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

const fn default_max_rounds() -> u32 {
    30
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        debug!(name = %scenario.name, path = %path.display(), "scenario loaded");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ScenarioError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ScenarioError::Invalid(e.to_string()))
    }

    /// A small mixed skirmish exercising every reference behavior.
    #[must_use]
    pub fn skirmish() -> Self {
        let attack = |damage, range, radius, knockback| AttackData {
            damage,
            range,
            radius,
            knockback,
            ..AttackData::default()
        };
        let hostile = |id: &str, health, priority, behavior: &str| UnitData {
            id: id.to_owned(),
            faction: Faction::Hostile,
            health: Some(health),
            starting_health: None,
            movement: 3,
            priority,
            pushable: true,
            accepts_status: true,
            behavior: Some(behavior.to_owned()),
            attack: AttackData::default(),
            spawns: Vec::new(),
            on_death_hazard: None,
        };

        let templates = vec![
            UnitData {
                faction: Faction::Player,
                behavior: None,
                ..hostile("hero", 8, 0, "")
            },
            UnitData {
                attack: attack(1, 1, 0, 0),
                ..hostile("grunt", 2, 2, "melee")
            },
            UnitData {
                attack: AttackData {
                    hazard: Some(HazardKind::Poison),
                    ..attack(1, 4, 1, 0)
                },
                ..hostile("grenadier", 2, 3, "grenadier")
            },
            UnitData {
                movement: 2,
                attack: attack(2, 6, 0, 0),
                ..hostile("sniper", 1, 1, "sniper")
            },
            UnitData {
                attack: attack(2, 4, 0, 2),
                pushable: false,
                ..hostile("destroyer", 4, 0, "destroyer")
            },
            UnitData {
                movement: 2,
                attack: AttackData {
                    duration: 1,
                    ..attack(1, 1, 0, 0)
                },
                ..hostile("guardian", 3, 4, "guardian")
            },
            UnitData {
                movement: 0,
                pushable: false,
                attack: AttackData {
                    cooldown: 2,
                    ..AttackData::default()
                },
                spawns: vec![WeightedTemplate {
                    template: String::from("grunt"),
                    weight: 1,
                }],
                on_death_hazard: Some(HazardSpec {
                    kind: HazardKind::Fire,
                    duration: Some(2),
                }),
                ..hostile("hive", 4, 5, "spawner")
            },
            UnitData {
                faction: Faction::Neutral,
                health: None,
                movement: 0,
                pushable: false,
                accepts_status: false,
                behavior: None,
                ..hostile("pillar", 0, 0, "")
            },
        ];

        Self {
            name: String::from("Skirmish"),
            description: String::from("One hero against a mixed hostile squad"),
            map: MapData {
                name: String::from("courtyard"),
                rows: [
                    "..........",
                    "..#....#..",
                    "..........",
                    "....##....",
                    "..........",
                    "..#....#..",
                    "..........",
                ]
                .iter()
                .map(|r| (*r).to_owned())
                .collect(),
                origin: (0, 0),
            },
            config: BattleConfig::default(),
            templates,
            placements: vec![
                UnitPlacement::new("hero", 0, 3),
                UnitPlacement::new("grunt", 8, 5),
                UnitPlacement::new("grunt", 8, 1),
                UnitPlacement::new("grenadier", 9, 4),
                UnitPlacement::new("sniper", 9, 6),
                UnitPlacement::new("destroyer", 9, 2),
                UnitPlacement::new("guardian", 9, 3),
                UnitPlacement::new("hive", 9, 0),
                UnitPlacement::new("pillar", 5, 5),
            ],
            max_rounds: default_max_rounds(),
        }
    }

    /// Look up a template by id.
    #[must_use]
    pub fn template(&self, id: &str) -> Option<&UnitData> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Check the scenario without building a battle.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.map.to_ground_source()?;

        let mut ids = BTreeSet::new();
        for template in &self.templates {
            if !ids.insert(template.id.as_str()) {
                return Err(ScenarioError::Invalid(format!(
                    "duplicate template '{}'",
                    template.id
                )));
            }
            if let Some(name) = &template.behavior {
                if !strategies::BEHAVIORS.contains(&name.as_str()) {
                    return Err(ScenarioError::Invalid(format!(
                        "template '{}' uses unknown behavior '{name}'",
                        template.id
                    )));
                }
            }
        }
        for spawn in self.templates.iter().flat_map(|t| &t.spawns) {
            if !ids.contains(spawn.template.as_str()) {
                return Err(ScenarioError::UnknownTemplate(spawn.template.clone()));
            }
        }

        let mut players = 0;
        for placement in &self.placements {
            let template = self
                .template(&placement.template)
                .ok_or_else(|| ScenarioError::UnknownTemplate(placement.template.clone()))?;
            if template.faction == Faction::Player {
                players += 1;
            }
        }
        if players != 1 {
            return Err(ScenarioError::Invalid(format!(
                "expected exactly one player placement, found {players}"
            )));
        }
        if self.max_rounds == 0 {
            return Err(ScenarioError::Invalid(String::from("max_rounds must be positive")));
        }
        Ok(())
    }

    /// Build an unstarted battle with every placement spawned.
    pub fn build_battle(&self, seed: u64) -> Result<Battle, ScenarioError> {
        self.validate()?;
        let world = World::from_map(&self.map, self.config.clone())?;
        let mut factory = TemplateFactory::new(&self.templates, self.config.clone());

        let mut units = Vec::with_capacity(self.placements.len());
        for placement in &self.placements {
            let cell = placement.cell();
            let spawned = factory
                .spawn(&placement.template, cell)
                .ok_or_else(|| ScenarioError::UnknownTemplate(placement.template.clone()))?;
            units.push((spawned, cell));
        }

        let mut battle = Battle::new(world, Box::new(factory)).with_seed(seed);
        for (spawned, cell) in units {
            battle.spawn_unit(&spawned.params, cell, spawned.behavior)?;
        }
        Ok(battle)
    }
}

/// Placement of a unit at scenario start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Template id.
    pub template: String,
    /// Cell `(x, y)`, with `(0, 0)` the bottom-left of the map.
    pub position: (i32, i32),
}

impl UnitPlacement {
    /// Create a new unit placement.
    #[must_use]
    pub fn new(template: impl Into<String>, x: i32, y: i32) -> Self {
        Self {
            template: template.into(),
            position: (x, y),
        }
    }

    /// Target cell.
    #[must_use]
    pub fn cell(&self) -> Cell {
        Cell::from(self.position)
    }
}
