//! Target handlers
//!
//! Every downstream handler follows the same shape: compute the candidate
//! set from the desired state, diff it against what the runtime store says
//! is provisioned, push the delta downstream, then record each change
//! locally. A local write that fails after the downstream call succeeded
//! raises a consistency suspect before the error propagates.

use super::{PendingChanges, ProvisioningContext, ProvisioningStep, StepReport};
use crate::collaborators::{DownstreamClient, Repository};
use crate::dictionary::Dictionary;
use crate::error::{PersistenceError, ProvisioningError};
use crate::target::ProvisioningTarget;
use async_trait::async_trait;
use indexmap::IndexMap;
use prov_model::{
    AugmentationDefinition, Definition, IndexDefinition, KpiDefinition, ResourceSubmission,
};
use prov_reconcile::{ConsistencySignal, DiffEngine};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn bookkeep(
    signal: &ConsistencySignal,
    step: &'static str,
    result: Result<(), PersistenceError>,
) -> Result<(), ProvisioningError> {
    result.map_err(|err| {
        signal.notify_suspect(step, 1);
        ProvisioningError::from(err)
    })
}

/// Diff `candidates` against `store` and apply the delta through `client`
pub(crate) async fn reconcile<T: Definition>(
    step: &'static str,
    client: &dyn DownstreamClient<T>,
    store: &dyn Repository<T>,
    candidates: &[T],
    signal: &ConsistencySignal,
) -> Result<StepReport, ProvisioningError> {
    let existing = store.find_all().await?;
    let delta = DiffEngine::of(existing).diff(candidates);
    let mut report = StepReport::new(step);
    if delta.is_empty() {
        tracing::debug!(step, candidates = candidates.len(), "target already up to date");
        return Ok(report);
    }

    for item in &delta.added {
        tracing::debug!(step, key = %item.key(), "create");
        client.create(item).await?;
        bookkeep(signal, step, store.save(item).await)?;
        report.created += 1;
    }
    for item in &delta.updated {
        tracing::debug!(step, key = %item.key(), "update");
        client.update(item).await?;
        bookkeep(signal, step, store.save(item).await)?;
        report.updated += 1;
    }
    for item in &delta.deleted {
        tracing::debug!(step, key = %item.key(), "delete");
        client.delete(item).await?;
        bookkeep(signal, step, store.delete(&item.key()).await)?;
        report.deleted += 1;
    }
    Ok(report)
}

/// Diff `candidates` against `store` and name the changed items
async fn runtime_changes<T: Definition>(
    store: &dyn Repository<T>,
    candidates: &[T],
) -> Result<(usize, BTreeSet<String>), ProvisioningError> {
    let delta = DiffEngine::of(store.find_all().await?).diff(candidates);
    let changed = delta
        .added
        .iter()
        .chain(&delta.updated)
        .chain(&delta.deleted)
        .map(|item| item.key().to_string())
        .collect();
    Ok((delta.len(), changed))
}

/// Push everything `store` holds to `target` again, logging drift first
///
/// A dry-run target has no remote view, so drift is not checked there.
pub(crate) async fn reassert<T: Definition>(
    step: &'static str,
    target: &ProvisioningTarget<T>,
    store: &dyn Repository<T>,
) -> Result<StepReport, ProvisioningError> {
    let provisioned = store.find_all().await?;
    let mut report = StepReport::new(step);
    if !target.is_dry_run() {
        let remote = target.get_all().await?;
        let drift = DiffEngine::of(remote).diff(&provisioned);
        if !drift.is_empty() {
            tracing::warn!(
                step,
                missing = drift.added.len(),
                differing = drift.updated.len(),
                unexpected = drift.deleted.len(),
                "downstream drift detected"
            );
        }
        report.drift = drift.len();
    }
    target.reassert(&provisioned).await?;
    report.reasserted = provisioned.len();
    Ok(report)
}

/// Augmentations referenced by at least one profile, in first-reference order
#[must_use]
pub fn effective_augmentations(submission: &ResourceSubmission) -> Vec<AugmentationDefinition> {
    let mut selected: IndexMap<&str, &AugmentationDefinition> = IndexMap::new();
    for profile in submission.profile_definitions.values() {
        for name in &profile.augmentations {
            if let Some(augmentation) = submission.augmentation(name) {
                selected.entry(name.as_str()).or_insert(augmentation);
            }
        }
    }
    selected.into_values().cloned().collect()
}

/// KPIs referenced by profiles plus every KPI they depend on
///
/// Dependencies come before dependents.
#[must_use]
pub fn effective_kpis(submission: &ResourceSubmission) -> Vec<KpiDefinition> {
    let roots = submission
        .profile_definitions
        .values()
        .flat_map(|profile| profile.kpis.iter().map(String::as_str));
    kpi_closure(submission, roots)
        .into_values()
        .cloned()
        .collect()
}

fn kpi_closure<'a>(
    submission: &'a ResourceSubmission,
    roots: impl IntoIterator<Item = &'a str>,
) -> IndexMap<&'a str, &'a KpiDefinition> {
    fn visit<'a>(
        submission: &'a ResourceSubmission,
        name: &'a str,
        visiting: &mut BTreeSet<&'a str>,
        selected: &mut IndexMap<&'a str, &'a KpiDefinition>,
    ) {
        if selected.contains_key(name) || !visiting.insert(name) {
            return;
        }
        if let Some(kpi) = submission.kpi(name) {
            for input in &kpi.inputs {
                visit(submission, input, visiting, selected);
            }
            selected.insert(name, kpi);
        }
        visiting.remove(name);
    }

    let mut selected = IndexMap::new();
    let mut visiting = BTreeSet::new();
    for name in roots {
        visit(submission, name, &mut visiting, &mut selected);
    }
    selected
}

/// Profiles whose KPIs, directly or through inputs, include one of `changed`
fn profiles_using_kpis(
    submission: &ResourceSubmission,
    changed: &BTreeSet<String>,
) -> BTreeSet<String> {
    submission
        .profile_definitions
        .values()
        .filter(|profile| {
            kpi_closure(submission, profile.kpis.iter().map(String::as_str))
                .keys()
                .any(|name| changed.contains(*name))
        })
        .map(|profile| profile.name.clone())
        .collect()
}

/// One index per profile over the tables of its provisioned KPIs
#[must_use]
pub fn effective_indexes(
    submission: &ResourceSubmission,
    provisioned_kpis: &[KpiDefinition],
) -> Vec<IndexDefinition> {
    let tables: BTreeMap<&str, String> = provisioned_kpis
        .iter()
        .map(|k| (k.name.as_str(), k.output_table()))
        .collect();
    submission
        .profile_definitions
        .values()
        .filter_map(|profile| {
            let kpis: BTreeSet<String> = profile
                .kpis
                .iter()
                .filter(|k| tables.contains_key(k.as_str()))
                .cloned()
                .collect();
            if kpis.is_empty() {
                return None;
            }
            let source_tables = kpis
                .iter()
                .filter_map(|k| tables.get(k.as_str()).cloned())
                .collect();
            Some(IndexDefinition {
                name: profile.name.clone(),
                kpis,
                source_tables,
            })
        })
        .collect()
}

/// Provisions augmentations to the augmentation service
pub struct AugmentationHandler {
    target: ProvisioningTarget<AugmentationDefinition>,
    store: Arc<dyn Repository<AugmentationDefinition>>,
    signal: Arc<ConsistencySignal>,
}

impl AugmentationHandler {
    pub const NAME: &'static str = "augmentation";

    #[must_use]
    pub fn new(
        target: ProvisioningTarget<AugmentationDefinition>,
        store: Arc<dyn Repository<AugmentationDefinition>>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        Self {
            target,
            store,
            signal,
        }
    }
}

#[async_trait]
impl ProvisioningStep for AugmentationHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        let candidates = effective_augmentations(ctx.submission);
        reconcile(
            Self::NAME,
            &self.target,
            &*self.store,
            &candidates,
            &self.signal,
        )
        .await
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        reassert(Self::NAME, &self.target, &*self.store).await
    }

    async fn pending(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<PendingChanges, ProvisioningError> {
        let candidates = effective_augmentations(submission);
        let (changes, changed) = runtime_changes(&*self.store, &candidates).await?;
        let profiles = submission
            .profile_definitions
            .values()
            .filter(|p| p.augmentations.iter().any(|a| changed.contains(a)))
            .map(|p| p.name.clone())
            .collect();
        Ok(PendingChanges { changes, profiles })
    }
}

/// Provisions KPIs to the KPI calculator
pub struct KpiHandler {
    target: ProvisioningTarget<KpiDefinition>,
    store: Arc<dyn Repository<KpiDefinition>>,
    signal: Arc<ConsistencySignal>,
}

impl KpiHandler {
    pub const NAME: &'static str = "kpi";

    #[must_use]
    pub fn new(
        target: ProvisioningTarget<KpiDefinition>,
        store: Arc<dyn Repository<KpiDefinition>>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        Self {
            target,
            store,
            signal,
        }
    }
}

#[async_trait]
impl ProvisioningStep for KpiHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        let candidates = effective_kpis(ctx.submission);
        reconcile(
            Self::NAME,
            &self.target,
            &*self.store,
            &candidates,
            &self.signal,
        )
        .await
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        reassert(Self::NAME, &self.target, &*self.store).await
    }

    async fn pending(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<PendingChanges, ProvisioningError> {
        let candidates = effective_kpis(submission);
        let (changes, changed) = runtime_changes(&*self.store, &candidates).await?;
        Ok(PendingChanges {
            changes,
            profiles: profiles_using_kpis(submission, &changed),
        })
    }
}

/// Provisions per-profile indexes to the indexer
pub struct IndexHandler {
    target: ProvisioningTarget<IndexDefinition>,
    store: Arc<dyn Repository<IndexDefinition>>,
    kpi_store: Arc<dyn Repository<KpiDefinition>>,
    signal: Arc<ConsistencySignal>,
}

impl IndexHandler {
    pub const NAME: &'static str = "index";

    #[must_use]
    pub fn new(
        target: ProvisioningTarget<IndexDefinition>,
        store: Arc<dyn Repository<IndexDefinition>>,
        kpi_store: Arc<dyn Repository<KpiDefinition>>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        Self {
            target,
            store,
            kpi_store,
            signal,
        }
    }
}

#[async_trait]
impl ProvisioningStep for IndexHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        let provisioned = self.kpi_store.find_all().await?;
        let candidates = effective_indexes(ctx.submission, &provisioned);
        reconcile(
            Self::NAME,
            &self.target,
            &*self.store,
            &candidates,
            &self.signal,
        )
        .await
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        reassert(Self::NAME, &self.target, &*self.store).await
    }

    async fn pending(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<PendingChanges, ProvisioningError> {
        // same KPI view as apply, so a disabled KPI target never looks pending
        let provisioned = self.kpi_store.find_all().await?;
        let candidates = effective_indexes(submission, &provisioned);
        // index names are profile names
        let (changes, profiles) = runtime_changes(&*self.store, &candidates).await?;
        Ok(PendingChanges { changes, profiles })
    }
}

/// Commits the dictionary delta after every downstream step succeeded
pub struct DictionaryStep {
    dictionary: Dictionary,
    signal: Arc<ConsistencySignal>,
}

impl DictionaryStep {
    pub const NAME: &'static str = "dictionary";

    #[must_use]
    pub fn new(dictionary: Dictionary, signal: Arc<ConsistencySignal>) -> Self {
        Self { dictionary, signal }
    }
}

#[async_trait]
impl ProvisioningStep for DictionaryStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        let delta = ctx.dictionary_delta;
        bookkeep(&self.signal, Self::NAME, self.dictionary.commit(delta).await)?;
        Ok(StepReport {
            created: delta.pm_schemas.added.len()
                + delta.pm_definitions.added.len()
                + delta.kpi_definitions.added.len()
                + delta.profile_definitions.added.len()
                + delta.augmentations.added.len(),
            updated: delta.pm_schemas.updated.len()
                + delta.pm_definitions.updated.len()
                + delta.kpi_definitions.updated.len()
                + delta.profile_definitions.updated.len()
                + delta.augmentations.updated.len(),
            deleted: delta.pm_schemas.deleted.len()
                + delta.pm_definitions.deleted.len()
                + delta.kpi_definitions.deleted.len()
                + delta.profile_definitions.deleted.len()
                + delta.augmentations.deleted.len(),
            ..StepReport::new(Self::NAME)
        })
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        Ok(StepReport::new(Self::NAME))
    }
}

/// Stand-in for a disabled target
#[derive(Debug, Clone, Copy)]
pub struct DisabledStep {
    name: &'static str,
}

impl DisabledStep {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl ProvisioningStep for DisabledStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        tracing::info!(
            step = self.name,
            affected_profiles = ctx.affected_profiles.len(),
            "target disabled, skipping"
        );
        Ok(StepReport::skipped(self.name))
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        tracing::info!(step = self.name, "target disabled, skipping re-assert");
        Ok(StepReport::skipped(self.name))
    }
}
