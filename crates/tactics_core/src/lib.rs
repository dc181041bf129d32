//! # Tactics Core
//!
//! Deterministic simulation core for a grid-based, turn-structured tactics
//! game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! This separation enables:
//! - Headless batch runs for AI tuning
//! - Replays from a seed and a list of player actions
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`navmesh`], [`pathfinding`], [`grid`] - Obstruction map, A* search, and the spatial index
//! - [`units`], [`status`], [`hazards`] - What lives on the grid
//! - [`world`] - Damage, movement and hazard rules
//! - [`action`], [`execution`] - Actions and their step-by-step execution
//! - [`scheduler`] - Priority-ordered turn queue
//! - [`battle`] - Round controller
//! - [`behavior`], [`events`] - Interfaces for AI, spawning and observers
//! - [`data`] - RON data definitions

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod battle;
pub mod behavior;
pub mod cell;
pub mod data;
pub mod error;
pub mod events;
pub mod execution;
pub mod grid;
pub mod hazards;
pub mod math;
pub mod navmesh;
pub mod pathfinding;
pub mod rng;
pub mod scheduler;
pub mod status;
pub mod units;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{Action, ActionKind, DamageHit, Intention};
    pub use crate::battle::{Battle, Outcome, Phase, StepResult};
    pub use crate::behavior::{
        DecisionContext, HostileBehavior, NullFactory, SpawnedUnit, UnitFactory,
    };
    pub use crate::cell::{Cell, Direction};
    pub use crate::data::{AttackData, BattleConfig, MapData, UnitData, WeightedTemplate};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{BattleEvent, EventRecorder, RoundObserver};
    pub use crate::grid::{Distance, SpatialIndex};
    pub use crate::hazards::{Hazard, HazardId, HazardKind, HazardSpec};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::navmesh::GroundSource;
    pub use crate::rng::DeterministicRng;
    pub use crate::scheduler::{ActionId, TurnScheduler};
    pub use crate::status::{StatusEffect, StatusKind};
    pub use crate::units::{ActionPoints, Faction, Health, Unit, UnitId, UnitSpawnParams};
    pub use crate::world::World;
}
