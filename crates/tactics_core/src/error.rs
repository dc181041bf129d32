//! Error types for the battle simulation.
//!
//! Unreachable paths and missing action targets are not errors: the former
//! are `None` / [`Distance::Unreachable`](crate::grid::Distance), the latter
//! are silent no-ops. Only programmer errors and setup violations end up here.

use thiserror::Error;

use crate::cell::Cell;
use crate::units::UnitId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all battle simulation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// A straight-line query was issued for two cells that share neither row nor column.
    #[error("Cells {a} and {b} are not in a straight line")]
    NotColinear {
        /// First cell of the request.
        a: Cell,
        /// Second cell of the request.
        b: Cell,
    },

    /// A cell outside the navmesh footprint was used where an in-bounds cell is required.
    #[error("Cell {0} is outside the map")]
    OutOfBounds(Cell),

    /// A cell that must be free already holds a unit or static obstacle.
    #[error("Cell {0} is occupied")]
    CellOccupied(Cell),

    /// Unknown unit identifier.
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// The unit is already registered with the spatial index.
    #[error("Unit {0} is already registered")]
    DuplicateUnit(UnitId),

    /// Setup violated the construct-then-wire contract.
    #[error("Battle wiring error: {0}")]
    Wiring(String),

    /// An operation was requested in the wrong phase.
    #[error("Operation not allowed during {phase} phase")]
    WrongPhase {
        /// Phase the battle was in.
        phase: String,
    },

    /// The player tried to spend more action points than available.
    #[error("Insufficient action points: need {required}, have {available}")]
    InsufficientActionPoints {
        /// Points required by the action.
        required: u32,
        /// Points the player currently has (including pooled).
        available: u32,
    },

    /// An action did not finish within the configured step bound.
    #[error("Action {action} of unit {unit} did not complete within {steps} steps")]
    ActionStalled {
        /// Owning unit.
        unit: UnitId,
        /// Action identifier.
        action: u64,
        /// Step bound that was exceeded.
        steps: u32,
    },

    /// Data file parsing error.
    #[error("Failed to parse data '{path}': {message}")]
    DataParseError {
        /// Path or label of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid simulation state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
