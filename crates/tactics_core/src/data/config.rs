//! Battle-wide tuning values.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::math::{fixed_decimal, Fixed};
use crate::units::ActionPoints;

/// Tuning values shared by every unit and action in a battle.
///
/// Every field has a default, so a RON file only needs the values it changes.
///
/// # Example RON
///
/// ```ron
/// BattleConfig(
///     move_speed: 0.5,
///     max_steps_per_action: 2000,
///     laser_damage: 2,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// World units per tile.
    #[serde(with = "fixed_decimal")]
    pub tile_size: Fixed,

    /// Tiles travelled per simulation step by move actions.
    #[serde(with = "fixed_decimal")]
    pub move_speed: Fixed,

    /// Tiles travelled per simulation step while being pushed.
    #[serde(with = "fixed_decimal")]
    pub push_speed: Fixed,

    /// Steps a single action may take before the battle reports it stalled.
    pub max_steps_per_action: u32,

    /// Damage dealt by laser hazards.
    pub laser_damage: u32,

    /// Damage per tick of Burning applied by fire hazards.
    pub fire_damage: u32,

    /// Ticks of Burning applied by fire hazards.
    pub fire_duration: u32,

    /// Damage per tick of Poisoned applied by poison hazards.
    pub poison_damage: u32,

    /// Ticks of Poisoned applied by poison hazards.
    pub poison_duration: u32,

    /// Action points granted to the player each turn.
    pub player_action_points: u32,

    /// Cap on action points the player carries between turns.
    pub player_action_point_pool: u32,

    /// Action points per tile moved by the player.
    pub player_move_cost: u32,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            tile_size: Fixed::ONE,
            move_speed: Fixed::from_num(1) / Fixed::from_num(4),
            push_speed: Fixed::from_num(1) / Fixed::from_num(2),
            max_steps_per_action: 10_000,
            laser_damage: 1,
            fire_damage: 1,
            fire_duration: 2,
            poison_damage: 1,
            poison_duration: 3,
            player_action_points: 5,
            player_action_point_pool: 3,
            player_move_cost: 1,
        }
    }
}

impl BattleConfig {
    /// Parse from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        super::parse_ron("BattleConfig", source)
    }

    /// Fresh player budget from these settings.
    #[must_use]
    pub fn player_budget(&self) -> ActionPoints {
        ActionPoints::new(self.player_action_points, self.player_action_point_pool)
    }
}
