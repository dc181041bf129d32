//! Unit factory backed by scenario templates.

use std::collections::BTreeMap;

use tracing::debug;

use tactics_core::behavior::{SpawnedUnit, UnitFactory};
use tactics_core::cell::Cell;
use tactics_core::data::{BattleConfig, UnitData};

use crate::strategies::behavior_for;

/// Builds units from [`UnitData`] templates.
#[derive(Debug, Clone)]
pub struct TemplateFactory {
    templates: BTreeMap<String, UnitData>,
    config: BattleConfig,
}

impl TemplateFactory {
    /// Index `templates` by id. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(templates: &[UnitData], config: BattleConfig) -> Self {
        Self {
            templates: templates
                .iter()
                .map(|t| (t.id.clone(), t.clone()))
                .collect(),
            config,
        }
    }

    /// Known template ids, sorted.
    pub fn template_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.templates.keys().map(String::as_str)
    }
}

impl UnitFactory for TemplateFactory {
    fn spawn(&mut self, template: &str, cell: Cell) -> Option<SpawnedUnit> {
        let data = self.templates.get(template)?;
        debug!(template, %cell, "building unit from template");
        Some(SpawnedUnit {
            params: data.to_spawn_params(&self.config),
            behavior: behavior_for(data),
        })
    }
}
