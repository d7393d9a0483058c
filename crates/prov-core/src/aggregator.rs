//! Multi-document aggregation into one desired state
//!
//! # Core Concepts
//!
//! - Documents are merged in load order; later definitions replace earlier
//!   ones with the same identity
//! - Validation runs per document against the cumulative submission
//! - Invalid PM definitions are dropped, everything else invalid aborts
//! - The result is diffed against the local dictionary to find out whether
//!   anything changed and which profiles must be re-provisioned
//! - Provisioned runtime state is folded in afterwards with
//!   [`Aggregation::absorb_pending`], so a target left behind the dictionary
//!   is provisioned again even when the input did not change

use crate::collaborators::Validator;
use crate::context::RunContext;
use crate::dictionary::{Dictionary, DictionaryDelta};
use crate::error::{ProvisioningError, ValidationError};
use crate::pipeline::PendingChanges;
use prov_model::{PartialSubmission, ResourceSubmission};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Output of one aggregation
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Cumulative desired state
    pub submission: ResourceSubmission,
    /// Difference between the desired state and the dictionary
    pub dictionary_delta: DictionaryDelta,
    /// Profiles whose provisioned resources must be rebuilt
    pub affected_profiles: BTreeSet<String>,
    /// Items the runtime stores lack or hold in another version
    pub runtime_changes: usize,
}

impl Aggregation {
    /// Nothing to provision; downstream state should only be re-asserted
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.dictionary_delta.is_empty()
            && self.affected_profiles.is_empty()
            && self.runtime_changes == 0
    }

    /// Fold in what the targets still have to provision
    pub fn absorb_pending(&mut self, pending: PendingChanges) {
        self.runtime_changes += pending.changes;
        self.affected_profiles.extend(pending.profiles);
    }
}

/// Merges and validates input documents
pub struct ResourceAggregator {
    validator: Arc<dyn Validator>,
    dictionary: Dictionary,
}

impl ResourceAggregator {
    #[must_use]
    pub fn new(validator: Arc<dyn Validator>, dictionary: Dictionary) -> Self {
        Self {
            validator,
            dictionary,
        }
    }

    /// Aggregate `documents` in order
    ///
    /// # Errors
    /// Returns [`ProvisioningError::Validation`] on the first invalid
    /// document, or [`ProvisioningError::Persistence`] if the dictionary
    /// cannot be read.
    pub async fn aggregate(
        &self,
        ctx: &RunContext,
        documents: Vec<PartialSubmission>,
    ) -> Result<Aggregation, ProvisioningError> {
        let mut submission = ResourceSubmission::new();
        let total = documents.len();
        for (index, document) in documents.into_iter().enumerate() {
            self.merge_document(ctx, &mut submission, document)
                .map_err(|err| {
                    tracing::error!(document = index, total, error = %err, "document rejected");
                    err
                })?;
        }

        let pm_definitions = ctx.flattened_pm_definitions();
        let dictionary_delta = self.dictionary.diff(&submission, &pm_definitions).await?;
        let affected_profiles = affected_profiles(&submission, &dictionary_delta);

        tracing::info!(
            documents = total,
            kpis = submission.kpi_definitions.len(),
            profiles = submission.profile_definitions.len(),
            augmentations = submission.augmentations.len(),
            dictionary_changes = dictionary_delta.len(),
            affected_profiles = affected_profiles.len(),
            "aggregation complete"
        );

        Ok(Aggregation {
            submission,
            dictionary_delta,
            affected_profiles,
            runtime_changes: 0,
        })
    }

    fn merge_document(
        &self,
        ctx: &RunContext,
        submission: &mut ResourceSubmission,
        mut document: PartialSubmission,
    ) -> Result<(), ValidationError> {
        // schemas first so this document's augmentations and PM definitions can see them
        if !document.pm_schemas.is_empty() {
            submission.record_schemas(&document.pm_schemas);
        }
        if !document.augmentations.is_empty() {
            self.validator
                .validate_augmentations(&document.augmentations, submission)?;
        }

        document.fold_counters();
        if !document.pm_definitions.is_empty() {
            // augmentation output schemas of this document count as known
            let mut view = submission.clone();
            view.augmentations.extend(document.augmentations.iter().cloned());
            let valid = self
                .validator
                .valid_pm_definitions(&document.pm_definitions, &view);
            let kept: usize = valid.values().map(Vec::len).sum();
            let dropped = document.pm_definitions.len().saturating_sub(kept);
            if dropped > 0 {
                tracing::warn!(dropped, kept, "invalid pm definitions dropped");
            }
            document.pm_definitions = valid.values().flatten().cloned().collect();
            ctx.merge_valid_pm(valid);
        }

        let introduces_profiles = !document.profile_definitions.is_empty();
        submission.merge(&document);

        if !submission.kpi_definitions.is_empty() {
            self.validator.validate_kpi_definitions(submission)?;
        }
        if introduces_profiles {
            self.validator.validate_profile_definitions(submission)?;
        }
        Ok(())
    }
}

/// Profiles that changed themselves or reference a changed KPI or augmentation
#[must_use]
pub fn affected_profiles(
    submission: &ResourceSubmission,
    delta: &DictionaryDelta,
) -> BTreeSet<String> {
    let profiles = &delta.profile_definitions;
    let mut affected: BTreeSet<String> = profiles
        .added
        .iter()
        .chain(&profiles.updated)
        .chain(&profiles.deleted)
        .map(|p| p.name.clone())
        .collect();

    let kpis = &delta.kpi_definitions;
    let changed_kpis: BTreeSet<&str> = kpis
        .added
        .iter()
        .chain(&kpis.updated)
        .map(|k| k.name.as_str())
        .collect();
    let augmentations = &delta.augmentations;
    let changed_augmentations: BTreeSet<&str> = augmentations
        .added
        .iter()
        .chain(&augmentations.updated)
        .map(|a| a.name.as_str())
        .collect();

    for profile in submission.profile_definitions.values() {
        let touches_kpi = profile
            .kpis
            .iter()
            .any(|k| changed_kpis.contains(k.as_str()));
        let touches_augmentation = profile
            .augmentations
            .iter()
            .any(|a| changed_augmentations.contains(a.as_str()));
        if touches_kpi || touches_augmentation {
            affected.insert(profile.name.clone());
        }
    }
    affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_model::{KpiDefinition, ProfileDefinition};
    use prov_reconcile::Delta;

    fn submission_with(profile: ProfileDefinition) -> ResourceSubmission {
        let mut submission = ResourceSubmission::new();
        submission.profile_definitions.upsert(profile);
        submission
    }

    #[test]
    fn changed_kpi_affects_referencing_profile() {
        let submission = submission_with(ProfileDefinition::new("p").with_kpis(["k"]));
        let delta = DictionaryDelta {
            kpi_definitions: Delta {
                updated: vec![KpiDefinition::new("k", "k", "x")],
                ..Delta::default()
            },
            ..DictionaryDelta::default()
        };

        let affected = affected_profiles(&submission, &delta);
        assert_eq!(affected, BTreeSet::from(["p".to_string()]));
    }

    #[test]
    fn deleted_profile_is_affected() {
        let submission = ResourceSubmission::new();
        let delta = DictionaryDelta {
            profile_definitions: Delta {
                deleted: vec![ProfileDefinition::new("gone")],
                ..Delta::default()
            },
            ..DictionaryDelta::default()
        };

        assert!(affected_profiles(&submission, &delta).contains("gone"));
    }

    #[test]
    fn unrelated_change_affects_nothing() {
        let submission = submission_with(ProfileDefinition::new("p").with_kpis(["k"]));
        let delta = DictionaryDelta {
            kpi_definitions: Delta {
                added: vec![KpiDefinition::new("other", "other", "x")],
                ..Delta::default()
            },
            ..DictionaryDelta::default()
        };

        assert!(affected_profiles(&submission, &delta).is_empty());
    }

    #[test]
    fn pending_runtime_work_defeats_the_shortcut() {
        let mut aggregation = Aggregation::default();
        assert!(aggregation.is_unchanged());

        aggregation.absorb_pending(PendingChanges {
            changes: 2,
            profiles: BTreeSet::from(["p".to_string()]),
        });

        assert!(!aggregation.is_unchanged());
        assert_eq!(aggregation.runtime_changes, 2);
        assert!(aggregation.affected_profiles.contains("p"));
    }
}
