//! Per-run scratch state
//!
//! [`RunContext`] carries what the aggregator accumulates across documents
//! that does not belong in the submission itself. It is cleared at the start
//! of every run, so no state leaks between runs.

use parking_lot::Mutex;
use prov_model::PmDefinition;
use std::collections::BTreeMap;

/// Valid PM definitions grouped by schema, each list ordered by name
pub type ValidPmDefinitions = BTreeMap<String, Vec<PmDefinition>>;

type Accumulator = BTreeMap<String, BTreeMap<String, PmDefinition>>;

/// Scratch state of one provisioning run
#[derive(Debug, Default)]
pub struct RunContext {
    /// Lazily created on first merge, dropped by [`reset`](Self::reset)
    valid_pm: Mutex<Option<Accumulator>>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything accumulated by a previous run
    pub fn reset(&self) {
        *self.valid_pm.lock() = None;
    }

    /// Merge one document's valid PM definitions.
    ///
    /// Within a schema the later definition of a name replaces the earlier.
    pub fn merge_valid_pm(&self, incoming: ValidPmDefinitions) {
        let mut guard = self.valid_pm.lock();
        let accumulator = guard.get_or_insert_with(BTreeMap::new);
        for (schema, definitions) in incoming {
            let by_name = accumulator.entry(schema).or_default();
            for definition in definitions {
                by_name.insert(definition.name.clone(), definition);
            }
        }
    }

    /// Snapshot of the accumulated definitions
    #[must_use]
    pub fn valid_pm_definitions(&self) -> ValidPmDefinitions {
        self.valid_pm
            .lock()
            .get_or_insert_with(BTreeMap::new)
            .iter()
            .map(|(schema, by_name)| (schema.clone(), by_name.values().cloned().collect()))
            .collect()
    }

    /// Accumulated definitions as one list, by schema then name
    #[must_use]
    pub fn flattened_pm_definitions(&self) -> Vec<PmDefinition> {
        self.valid_pm_definitions()
            .into_values()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group(schema: &str, defs: &[(&str, &str)]) -> ValidPmDefinitions {
        let definitions = defs
            .iter()
            .map(|(name, description)| PmDefinition::new(schema, *name).with_description(*description))
            .collect();
        BTreeMap::from([(schema.to_string(), definitions)])
    }

    #[test]
    fn later_definition_wins_by_name() {
        let ctx = RunContext::new();
        ctx.merge_valid_pm(group("cell", &[("drops", "v1"), ("attempts", "v1")]));
        ctx.merge_valid_pm(group("cell", &[("drops", "v2")]));

        let merged = ctx.valid_pm_definitions();
        let cell = &merged["cell"];
        assert_eq!(cell.len(), 2);
        assert_eq!(cell[0].name, "attempts");
        assert_eq!(cell[1].description.as_deref(), Some("v2"));
    }

    #[test]
    fn schemas_are_independent() {
        let ctx = RunContext::new();
        ctx.merge_valid_pm(group("cell", &[("drops", "a")]));
        ctx.merge_valid_pm(group("link", &[("drops", "b")]));

        assert_eq!(ctx.flattened_pm_definitions().len(), 2);
    }

    #[test]
    fn reset_clears_accumulator() {
        let ctx = RunContext::new();
        ctx.merge_valid_pm(group("cell", &[("drops", "a")]));
        ctx.reset();

        assert!(ctx.valid_pm_definitions().is_empty());
    }
}
