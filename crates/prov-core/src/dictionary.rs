//! Local dictionary of accepted definitions
//!
//! The dictionary mirrors the last successfully provisioned desired state.
//! The aggregator diffs against it to detect changes; the final pipeline
//! step commits the computed delta back into it.

use crate::collaborators::Repository;
use crate::error::PersistenceError;
use prov_model::{
    AugmentationDefinition, Definition, KpiDefinition, PmDefinition, PmSchema, ProfileDefinition,
    ResourceSubmission,
};
use prov_reconcile::{Delta, DiffEngine};
use std::fmt;
use std::sync::Arc;

/// Repositories holding the local dictionary
#[derive(Clone)]
pub struct Dictionary {
    pub pm_schemas: Arc<dyn Repository<PmSchema>>,
    pub pm_definitions: Arc<dyn Repository<PmDefinition>>,
    pub kpi_definitions: Arc<dyn Repository<KpiDefinition>>,
    pub profile_definitions: Arc<dyn Repository<ProfileDefinition>>,
    pub augmentations: Arc<dyn Repository<AugmentationDefinition>>,
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary").finish_non_exhaustive()
    }
}

/// Per-kind deltas between a submission and the dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictionaryDelta {
    pub pm_schemas: Delta<PmSchema>,
    pub pm_definitions: Delta<PmDefinition>,
    pub kpi_definitions: Delta<KpiDefinition>,
    pub profile_definitions: Delta<ProfileDefinition>,
    pub augmentations: Delta<AugmentationDefinition>,
}

impl DictionaryDelta {
    /// Whether every kind is unchanged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pm_schemas.is_empty()
            && self.pm_definitions.is_empty()
            && self.kpi_definitions.is_empty()
            && self.profile_definitions.is_empty()
            && self.augmentations.is_empty()
    }

    /// Total number of changed definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.pm_schemas.len()
            + self.pm_definitions.len()
            + self.kpi_definitions.len()
            + self.profile_definitions.len()
            + self.augmentations.len()
    }
}

impl Dictionary {
    /// Diff a submission against the stored dictionary
    ///
    /// `pm_definitions` replaces the submission's PM definitions, so callers
    /// can pass the validated subset.
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when a repository cannot be read.
    pub async fn diff(
        &self,
        submission: &ResourceSubmission,
        pm_definitions: &[PmDefinition],
    ) -> Result<DictionaryDelta, PersistenceError> {
        Ok(DictionaryDelta {
            pm_schemas: diff_kind(&*self.pm_schemas, &submission.pm_schemas.to_vec()).await?,
            pm_definitions: diff_kind(&*self.pm_definitions, pm_definitions).await?,
            kpi_definitions: diff_kind(
                &*self.kpi_definitions,
                &submission.kpi_definitions.to_vec(),
            )
            .await?,
            profile_definitions: diff_kind(
                &*self.profile_definitions,
                &submission.profile_definitions.to_vec(),
            )
            .await?,
            augmentations: diff_kind(&*self.augmentations, &submission.augmentations.to_vec())
                .await?,
        })
    }

    /// Persist a delta
    ///
    /// # Errors
    /// Returns the first [`PersistenceError`]; earlier writes stay applied.
    pub async fn commit(&self, delta: &DictionaryDelta) -> Result<(), PersistenceError> {
        apply_kind(&*self.pm_schemas, &delta.pm_schemas).await?;
        apply_kind(&*self.pm_definitions, &delta.pm_definitions).await?;
        apply_kind(&*self.augmentations, &delta.augmentations).await?;
        apply_kind(&*self.kpi_definitions, &delta.kpi_definitions).await?;
        apply_kind(&*self.profile_definitions, &delta.profile_definitions).await?;
        tracing::debug!(changes = delta.len(), "dictionary committed");
        Ok(())
    }

    /// Remove every stored definition
    ///
    /// # Errors
    /// Returns the first [`PersistenceError`].
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.profile_definitions.delete_all().await?;
        self.kpi_definitions.delete_all().await?;
        self.augmentations.delete_all().await?;
        self.pm_definitions.delete_all().await?;
        self.pm_schemas.delete_all().await?;
        Ok(())
    }
}

async fn diff_kind<T: Definition>(
    repository: &dyn Repository<T>,
    candidates: &[T],
) -> Result<Delta<T>, PersistenceError> {
    let existing = repository.find_all().await?;
    Ok(DiffEngine::of(existing).diff(candidates))
}

async fn apply_kind<T: Definition>(
    repository: &dyn Repository<T>,
    delta: &Delta<T>,
) -> Result<(), PersistenceError> {
    for item in delta.added.iter().chain(&delta.updated) {
        repository.save(item).await?;
    }
    for item in &delta.deleted {
        repository.delete(&item.key()).await?;
    }
    Ok(())
}
