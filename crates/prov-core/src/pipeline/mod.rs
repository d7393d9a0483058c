//! Provisioning pipeline
//!
//! Runs the ordered provisioning steps inside one lifecycle run.
//!
//! # Critical Invariant
//!
//! Steps run strictly in order: augmentations, KPIs, indexes, then the
//! dictionary commit. The first failing step aborts the run, the
//! compensations of the steps that already completed run in reverse order,
//! and the run is closed with `ERROR`.
//!
//! An illegal lifecycle transition is not a run failure: it means the
//! persisted state no longer matches what this process believes, so it is
//! raised as a consistency failure and no `ERROR` record is written.

pub mod handlers;

use crate::dictionary::DictionaryDelta;
use crate::error::ProvisioningError;
use crate::lifecycle::ProvisioningLifecycle;
use crate::telemetry;
use async_trait::async_trait;
use prov_model::{ProvisioningStatus, ResourceSubmission};
use prov_reconcile::ConsistencySignal;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub use handlers::{
    AugmentationHandler, DictionaryStep, DisabledStep, IndexHandler, KpiHandler,
};

/// Inputs every step sees
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningContext<'a> {
    /// Desired state
    pub submission: &'a ResourceSubmission,
    /// Dictionary changes computed during aggregation
    pub dictionary_delta: &'a DictionaryDelta,
    /// Profiles whose resources must be rebuilt
    pub affected_profiles: &'a BTreeSet<String>,
}

/// What one step did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub step: &'static str,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Items pushed again during a re-assert pass
    pub reasserted: usize,
    /// Items whose downstream copy differed from the provisioned snapshot
    pub drift: usize,
    /// Step did nothing because its target is disabled
    pub skipped: bool,
}

impl StepReport {
    #[must_use]
    pub fn new(step: &'static str) -> Self {
        Self {
            step,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn skipped(step: &'static str) -> Self {
        Self {
            step,
            skipped: true,
            ..Self::default()
        }
    }

    /// Whether the step changed anything
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.deleted > 0
    }
}

/// Runtime work a step would do for a desired state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    /// Items to create, update or delete on the target
    pub changes: usize,
    /// Profiles owning those items
    pub profiles: BTreeSet<String>,
}

impl PendingChanges {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes == 0 && self.profiles.is_empty()
    }

    pub fn absorb(&mut self, other: PendingChanges) {
        self.changes += other.changes;
        self.profiles.extend(other.profiles);
    }
}

/// Compensation for a completed step
pub enum Rollback {
    /// Nothing to undo
    Noop,
    /// Undo action, run at most once
    Compensate(Box<dyn FnOnce() + Send>),
}

impl Rollback {
    fn run(self, step: &'static str) {
        match self {
            Self::Noop => tracing::debug!(step, "no compensation registered"),
            Self::Compensate(undo) => {
                tracing::warn!(step, "compensating completed step");
                undo();
            }
        }
    }
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => f.write_str("Noop"),
            Self::Compensate(_) => f.write_str("Compensate"),
        }
    }
}

/// One stage of the provisioning pipeline
#[async_trait]
pub trait ProvisioningStep: Send + Sync {
    /// Stable step name used in logs and reports
    fn name(&self) -> &'static str;

    /// Reconcile the target with the desired state
    async fn apply(&self, ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError>;

    /// Push already provisioned state to the target again
    async fn reassert(&self) -> Result<StepReport, ProvisioningError>;

    /// Difference between `submission` and what the target has provisioned
    async fn pending(
        &self,
        _submission: &ResourceSubmission,
    ) -> Result<PendingChanges, ProvisioningError> {
        Ok(PendingChanges::default())
    }

    /// Compensation for a completed [`apply`](Self::apply)
    fn rollback(&self) -> Rollback {
        Rollback::Noop
    }
}

/// Result of a completed provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub steps: Vec<StepReport>,
}

/// Ordered steps bound to a lifecycle
pub struct ProvisioningPipeline {
    steps: Vec<Arc<dyn ProvisioningStep>>,
    lifecycle: Arc<ProvisioningLifecycle>,
    signal: Arc<ConsistencySignal>,
}

impl ProvisioningPipeline {
    #[must_use]
    pub fn new(
        steps: Vec<Arc<dyn ProvisioningStep>>,
        lifecycle: Arc<ProvisioningLifecycle>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        Self {
            steps,
            lifecycle,
            signal,
        }
    }

    /// Names of the steps in execution order
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step inside a new lifecycle run
    ///
    /// # Errors
    /// Returns the first step failure, or a consistency failure when the
    /// lifecycle rejects a transition.
    pub async fn run(
        &self,
        ctx: &ProvisioningContext<'_>,
    ) -> Result<PipelineReport, ProvisioningError> {
        let run = self
            .lifecycle
            .transition(ProvisioningStatus::Started)
            .await
            .map_err(|err| self.classify(err))?;
        tracing::info!(run_id = %run.id, steps = self.steps.len(), "provisioning run started");

        let mut completed: Vec<(&'static str, Rollback)> = Vec::with_capacity(self.steps.len());
        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let name = step.name();
            tracing::debug!(run_id = %run.id, step = name, "step started");
            match step.apply(ctx).await {
                Ok(report) => {
                    tracing::info!(
                        run_id = %run.id,
                        step = name,
                        created = report.created,
                        updated = report.updated,
                        deleted = report.deleted,
                        skipped = report.skipped,
                        "step completed"
                    );
                    completed.push((name, step.rollback()));
                    reports.push(report);
                }
                Err(err) => {
                    tracing::error!(run_id = %run.id, step = name, error = %err, "step failed");
                    for (done, rollback) in completed.into_iter().rev() {
                        rollback.run(done);
                    }
                    return Err(self.fail(err).await);
                }
            }
        }

        self.lifecycle
            .transition(ProvisioningStatus::Completed)
            .await
            .map_err(|err| self.classify(err))?;
        telemetry::record_run("completed");
        tracing::info!(run_id = %run.id, "provisioning run completed");

        Ok(PipelineReport {
            run_id: run.id,
            steps: reports,
        })
    }

    /// Re-assert every step without touching the lifecycle
    ///
    /// # Errors
    /// Returns the first step failure.
    pub async fn reassert(&self) -> Result<Vec<StepReport>, ProvisioningError> {
        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let report = step.reassert().await.map_err(|err| {
                tracing::error!(step = step.name(), error = %err, "re-assert failed");
                err
            })?;
            reports.push(report);
        }
        tracing::info!(steps = reports.len(), "downstream state re-asserted");
        Ok(reports)
    }

    /// Runtime work outstanding across every step
    ///
    /// # Errors
    /// Returns the first runtime store failure.
    pub async fn pending(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<PendingChanges, ProvisioningError> {
        let mut pending = PendingChanges::default();
        for step in &self.steps {
            let step_pending = step.pending(submission).await?;
            if !step_pending.is_empty() {
                tracing::debug!(
                    step = step.name(),
                    changes = step_pending.changes,
                    profiles = step_pending.profiles.len(),
                    "provisioned state behind desired state"
                );
            }
            pending.absorb(step_pending);
        }
        Ok(pending)
    }

    /// Close the run with `ERROR` and return the error to surface
    async fn fail(&self, err: ProvisioningError) -> ProvisioningError {
        if err.is_state_transition() {
            return self.classify(err);
        }
        telemetry::record_run("error");
        match self.lifecycle.transition(ProvisioningStatus::Error).await {
            Ok(_) => err,
            Err(transition) if transition.is_state_transition() => {
                tracing::error!(
                    original = %err,
                    error = %transition,
                    "could not record provisioning failure"
                );
                self.classify(transition)
            }
            Err(transition) => {
                // run stays STARTED in the store
                tracing::error!(
                    original = %err,
                    error = %transition,
                    "could not record provisioning failure"
                );
                self.signal.notify_suspect("lifecycle", 1);
                err
            }
        }
    }

    /// Rejected transitions become consistency failures
    fn classify(&self, err: ProvisioningError) -> ProvisioningError {
        if err.is_state_transition() {
            self.signal.notify_suspect("lifecycle", 1);
            ProvisioningError::consistency_check(err)
        } else {
            err
        }
    }
}

impl fmt::Debug for ProvisioningPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningPipeline")
            .field("steps", &self.step_names())
            .finish_non_exhaustive()
    }
}
