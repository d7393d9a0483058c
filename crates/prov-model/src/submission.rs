//! Partial input documents and the accumulated desired-state model
//!
//! A run folds an ordered sequence of [`PartialSubmission`]s into one
//! [`ResourceSubmission`]. Merging is structural: for every kind, an entry
//! sharing an identity key with an earlier one replaces it in place, new
//! entries are appended. Later documents therefore win.

use crate::augmentation::AugmentationDefinition;
use crate::definition::Definition;
use crate::kpi::KpiDefinition;
use crate::pm::{PmCounter, PmDefinition, PmSchema};
use crate::profile::ProfileDefinition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One parsed input document
///
/// Every list is optional in the serialized form; an empty list means the
/// document does not carry that kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialSubmission {
    #[serde(default)]
    pub pm_schemas: Vec<PmSchema>,
    #[serde(default)]
    pub pm_definitions: Vec<PmDefinition>,
    #[serde(default)]
    pub pm_counters: Vec<PmCounter>,
    #[serde(default)]
    pub kpi_definitions: Vec<KpiDefinition>,
    #[serde(default)]
    pub profile_definitions: Vec<ProfileDefinition>,
    #[serde(default)]
    pub augmentations: Vec<AugmentationDefinition>,
}

impl PartialSubmission {
    /// Create empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With PM schemas
    #[inline]
    #[must_use]
    pub fn with_schemas(mut self, schemas: Vec<PmSchema>) -> Self {
        self.pm_schemas = schemas;
        self
    }

    /// With PM definitions
    #[inline]
    #[must_use]
    pub fn with_pm_definitions(mut self, definitions: Vec<PmDefinition>) -> Self {
        self.pm_definitions = definitions;
        self
    }

    /// With PM counters
    #[inline]
    #[must_use]
    pub fn with_pm_counters(mut self, counters: Vec<PmCounter>) -> Self {
        self.pm_counters = counters;
        self
    }

    /// With KPI definitions
    #[inline]
    #[must_use]
    pub fn with_kpis(mut self, kpis: Vec<KpiDefinition>) -> Self {
        self.kpi_definitions = kpis;
        self
    }

    /// With profile definitions
    #[inline]
    #[must_use]
    pub fn with_profiles(mut self, profiles: Vec<ProfileDefinition>) -> Self {
        self.profile_definitions = profiles;
        self
    }

    /// With augmentation definitions
    #[inline]
    #[must_use]
    pub fn with_augmentations(mut self, augmentations: Vec<AugmentationDefinition>) -> Self {
        self.augmentations = augmentations;
        self
    }

    /// Fold `pm_counters` into `pm_definitions`.
    ///
    /// Explicit definitions take precedence over counter-derived ones with the
    /// same identity. Counters are consumed.
    pub fn fold_counters(&mut self) {
        if self.pm_counters.is_empty() {
            return;
        }
        for counter in std::mem::take(&mut self.pm_counters) {
            let derived = PmDefinition::from(counter);
            let key = derived.key();
            if !self.pm_definitions.iter().any(|d| d.key() == key) {
                self.pm_definitions.push(derived);
            }
        }
    }

    /// Whether the document carries nothing at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pm_schemas.is_empty()
            && self.pm_definitions.is_empty()
            && self.pm_counters.is_empty()
            && self.kpi_definitions.is_empty()
            && self.profile_definitions.is_empty()
            && self.augmentations.is_empty()
    }
}

/// Insertion-ordered, identity-keyed collection of one definition kind
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionMap<T: Definition> {
    entries: IndexMap<T::Key, T>,
}

impl<T: Definition> Default for DefinitionMap<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T: Definition> DefinitionMap<T> {
    /// Insert or replace by identity key (last wins, position kept)
    pub fn upsert(&mut self, item: T) {
        self.entries.insert(item.key(), item);
    }

    /// Upsert every item in order
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.upsert(item);
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.entries.get(key)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Cloned values in insertion order
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.values().cloned().collect()
    }
}

/// Desired-state model accumulated over one run
///
/// Mutable while documents are merged; treated as read-only once the
/// aggregator hands it to the diff phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSubmission {
    pub pm_schemas: DefinitionMap<PmSchema>,
    pub pm_definitions: DefinitionMap<PmDefinition>,
    pub kpi_definitions: DefinitionMap<KpiDefinition>,
    pub profile_definitions: DefinitionMap<ProfileDefinition>,
    pub augmentations: DefinitionMap<AugmentationDefinition>,
}

impl ResourceSubmission {
    /// Create empty submission
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record PM schemas ahead of the structural merge
    pub fn record_schemas(&mut self, schemas: &[PmSchema]) {
        self.pm_schemas.extend(schemas.iter().cloned());
    }

    /// Structural merge of one document into this submission
    pub fn merge(&mut self, document: &PartialSubmission) {
        self.pm_schemas.extend(document.pm_schemas.iter().cloned());
        // counters first so same-document explicit definitions win
        self.pm_definitions
            .extend(document.pm_counters.iter().cloned().map(PmDefinition::from));
        self.pm_definitions
            .extend(document.pm_definitions.iter().cloned());
        self.kpi_definitions
            .extend(document.kpi_definitions.iter().cloned());
        self.profile_definitions
            .extend(document.profile_definitions.iter().cloned());
        self.augmentations.extend(document.augmentations.iter().cloned());
    }

    #[inline]
    #[must_use]
    pub fn has_schema(&self, name: &str) -> bool {
        self.pm_schemas.contains(&name.to_string())
            || self.augmentations.values().any(|a| a.output_schema == name)
    }

    /// Whether any PM definition in any schema carries this name
    #[must_use]
    pub fn has_pm_definition_named(&self, name: &str) -> bool {
        self.pm_definitions.values().any(|d| d.name == name)
    }

    #[inline]
    #[must_use]
    pub fn kpi(&self, name: &str) -> Option<&KpiDefinition> {
        self.kpi_definitions.get(&name.to_string())
    }

    #[inline]
    #[must_use]
    pub fn augmentation(&self, name: &str) -> Option<&AugmentationDefinition> {
        self.augmentations.get(&name.to_string())
    }

    /// Whether the submission holds no definitions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pm_schemas.is_empty()
            && self.pm_definitions.is_empty()
            && self.kpi_definitions.is_empty()
            && self.profile_definitions.is_empty()
            && self.augmentations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_later_document_wins_in_place() {
        let mut submission = ResourceSubmission::new();
        submission.merge(&PartialSubmission::new().with_kpis(vec![
            KpiDefinition::new("a", "cell", "x"),
            KpiDefinition::new("b", "cell", "y"),
        ]));
        submission.merge(
            &PartialSubmission::new().with_kpis(vec![KpiDefinition::new("a", "cell", "x2")]),
        );

        let kpis = submission.kpi_definitions.to_vec();
        assert_eq!(kpis.len(), 2);
        assert_eq!(kpis[0].expression, "x2");
        assert_eq!(kpis[1].name, "b");
    }

    #[test]
    fn fold_counters_keeps_explicit_definition() {
        let mut doc = PartialSubmission::new()
            .with_pm_definitions(vec![
                PmDefinition::new("ran", "pmA").with_description("explicit")
            ])
            .with_pm_counters(vec![
                PmCounter {
                    schema: "ran".to_string(),
                    name: "pmA".to_string(),
                    description: Some("counter".to_string()),
                },
                PmCounter {
                    schema: "ran".to_string(),
                    name: "pmB".to_string(),
                    description: None,
                },
            ]);

        doc.fold_counters();

        assert!(doc.pm_counters.is_empty());
        assert_eq!(doc.pm_definitions.len(), 2);
        assert_eq!(doc.pm_definitions[0].description.as_deref(), Some("explicit"));
        assert_eq!(doc.pm_definitions[1].name, "pmB");
    }

    #[test]
    fn augmentation_output_counts_as_schema() {
        let mut submission = ResourceSubmission::new();
        submission.merge(&PartialSubmission::new().with_augmentations(vec![
            AugmentationDefinition::new("geo", "http://geo", "ran_geo"),
        ]));

        assert!(submission.has_schema("ran_geo"));
        assert!(!submission.has_schema("ran"));
    }

    #[test]
    fn document_deserializes_from_yaml() {
        let yaml = r"
pm_schemas:
  - name: ran
    namespace: 5g
    counters: [pmA]
pm_counters:
  - schema: ran
    name: pmA
kpi_definitions:
  - name: a_rate
    alias: cell
    expression: pmA / 60
    aggregation_period: 60
    inputs: [pmA]
";
        let doc: PartialSubmission = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(doc.pm_schemas[0].counters, vec!["pmA".to_string()]);
        assert_eq!(doc.kpi_definitions[0].aggregation_period, Some(60));
        assert!(doc.profile_definitions.is_empty());
    }
}
