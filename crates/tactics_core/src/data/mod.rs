//! Data structures for battle configuration.
//!
//! Pure data types deserialized from RON: battle tuning, map layouts and
//! unit templates.
//!
//! **Note:** This module contains no IO - it only parses strings.
//! File loading is handled by `tactics_headless`.

mod config;
mod map_data;
mod unit_data;

pub use config::BattleConfig;
pub use map_data::MapData;
pub use unit_data::{AttackData, UnitData, WeightedTemplate};

use serde::de::DeserializeOwned;

use crate::error::{GameError, Result};

/// Parse any data type from RON, labelling errors with `label`.
pub fn parse_ron<T: DeserializeOwned>(label: &str, source: &str) -> Result<T> {
    ron::from_str(source).map_err(|e| GameError::DataParseError {
        path: label.to_owned(),
        message: e.to_string(),
    })
}
