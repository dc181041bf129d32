//! Status effects attached to units.
//!
//! Effects are plain data; their consequences (damage, shields) are applied
//! by [`World`](crate::world::World) when it runs turn hooks, so that damage
//! from a status goes through the same resolution as any other damage.

use serde::{Deserialize, Serialize};

use crate::units::UnitId;

/// A status effect and its remaining lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusEffect {
    /// Damage at the start of each of the unit's turns.
    Burning {
        /// Damage per tick.
        damage: u32,
        /// Ticks left.
        remaining: u32,
    },
    /// Damage at the end of each of the unit's turns.
    Poisoned {
        /// Damage per tick.
        damage: u32,
        /// Ticks left.
        remaining: u32,
    },
    /// Hostiles move half as far (at least one tile); the player pays double per tile.
    Slowed {
        /// Turn ends left.
        remaining: u32,
    },
    /// Sets the unit's shield once. Never stays attached.
    Shield {
        /// Shield points granted.
        amount: u32,
    },
    /// Shield that is cleared when the effect expires.
    TemporaryShield {
        /// Shield points granted.
        amount: u32,
        /// Extra turn ends before expiry.
        remaining: u32,
    },
    /// Incoming damage is taken by `protector` while it lives.
    Protected {
        /// Unit absorbing the damage.
        protector: UnitId,
        /// Turn ends left.
        remaining: u32,
    },
}

/// Payload-free tag for [`StatusEffect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusKind {
    /// See [`StatusEffect::Burning`].
    Burning,
    /// See [`StatusEffect::Poisoned`].
    Poisoned,
    /// See [`StatusEffect::Slowed`].
    Slowed,
    /// See [`StatusEffect::Shield`].
    Shield,
    /// See [`StatusEffect::TemporaryShield`].
    TemporaryShield,
    /// See [`StatusEffect::Protected`].
    Protected,
}

/// Outcome of running one hook on one effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTick {
    /// Damage the effect deals to its host this tick.
    pub damage: u32,
    /// The effect should be removed after this tick.
    pub expired: bool,
}

impl StatusEffect {
    /// Tag of this effect.
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        match self {
            Self::Burning { .. } => StatusKind::Burning,
            Self::Poisoned { .. } => StatusKind::Poisoned,
            Self::Slowed { .. } => StatusKind::Slowed,
            Self::Shield { .. } => StatusKind::Shield,
            Self::TemporaryShield { .. } => StatusKind::TemporaryShield,
            Self::Protected { .. } => StatusKind::Protected,
        }
    }

    /// Shield granted when the effect is added, if any.
    #[must_use]
    pub const fn shield_on_add(&self) -> Option<u32> {
        match self {
            Self::Shield { amount } | Self::TemporaryShield { amount, .. } => Some(*amount),
            _ => None,
        }
    }

    /// Effects that act once on add and are never stored.
    #[must_use]
    pub const fn is_instant(&self) -> bool {
        matches!(self, Self::Shield { .. })
    }

    /// Effects whose removal clears the host's shield.
    #[must_use]
    pub const fn clears_shield_on_remove(&self) -> bool {
        matches!(self, Self::TemporaryShield { .. })
    }

    /// Hook run when the host's turn starts.
    pub fn on_turn_start(&mut self) -> StatusTick {
        match self {
            Self::Burning { damage, remaining } => tick_down(*damage, remaining),
            _ => StatusTick::default(),
        }
    }

    /// Hook run when the host's turn ends.
    pub fn on_turn_end(&mut self) -> StatusTick {
        match self {
            Self::Poisoned { damage, remaining } => tick_down(*damage, remaining),
            Self::Slowed { remaining } | Self::Protected { remaining, .. } => {
                tick_down(0, remaining)
            }
            // Counts down to zero, then expires on the following turn end.
            Self::TemporaryShield { remaining, .. } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    StatusTick::default()
                } else {
                    StatusTick {
                        damage: 0,
                        expired: true,
                    }
                }
            }
            Self::Burning { .. } | Self::Shield { .. } => StatusTick::default(),
        }
    }
}

fn tick_down(damage: u32, remaining: &mut u32) -> StatusTick {
    *remaining = remaining.saturating_sub(1);
    StatusTick {
        damage,
        expired: *remaining == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burning_ticks_on_turn_start_only() {
        let mut burn = StatusEffect::Burning {
            damage: 2,
            remaining: 2,
        };
        assert_eq!(burn.on_turn_end(), StatusTick::default());
        assert_eq!(
            burn.on_turn_start(),
            StatusTick {
                damage: 2,
                expired: false
            }
        );
        assert_eq!(
            burn.on_turn_start(),
            StatusTick {
                damage: 2,
                expired: true
            }
        );
    }

    #[test]
    fn test_poison_ticks_on_turn_end() {
        let mut poison = StatusEffect::Poisoned {
            damage: 1,
            remaining: 1,
        };
        assert_eq!(poison.on_turn_start(), StatusTick::default());
        assert_eq!(
            poison.on_turn_end(),
            StatusTick {
                damage: 1,
                expired: true
            }
        );
    }

    #[test]
    fn test_temporary_shield_outlives_its_counter_by_one_turn() {
        let mut shield = StatusEffect::TemporaryShield {
            amount: 3,
            remaining: 1,
        };
        assert_eq!(shield.shield_on_add(), Some(3));
        assert!(!shield.on_turn_end().expired);
        assert!(shield.on_turn_end().expired);
        assert!(shield.clears_shield_on_remove());
    }

    #[test]
    fn test_shield_is_instant() {
        let shield = StatusEffect::Shield { amount: 5 };
        assert!(shield.is_instant());
        assert_eq!(shield.kind(), StatusKind::Shield);
        assert!(!shield.clears_shield_on_remove());
    }

    #[test]
    fn test_protected_expires() {
        let mut protected = StatusEffect::Protected {
            protector: 4,
            remaining: 1,
        };
        assert!(protected.on_turn_end().expired);
    }
}
