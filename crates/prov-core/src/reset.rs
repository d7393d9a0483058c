//! Reset pipeline
//!
//! Tears down everything provisioned, in dependency order: KPIs first,
//! then augmentations, then indexes, then the local stores. The chain is
//! fail-fast. Each step keeps its own error counter and timing, and the
//! totals are published whether or not the chain succeeded. The lifecycle
//! only enters `RESET` when every step succeeded.

use crate::collaborators::{DownstreamClient, Repository};
use crate::dictionary::Dictionary;
use crate::error::ProvisioningError;
use crate::lifecycle::ProvisioningLifecycle;
use crate::target::ProvisioningTarget;
use crate::telemetry::{self, StepMeter};
use async_trait::async_trait;
use prov_model::{Definition, ProvisioningStatus};
use prov_reconcile::ConsistencySignal;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One stage of the reset chain
#[async_trait]
pub trait ResetStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self) -> Result<(), ProvisioningError>;
}

/// Clears one downstream target and its runtime store
pub struct TargetReset<T: Definition> {
    name: &'static str,
    target: ProvisioningTarget<T>,
    store: Arc<dyn Repository<T>>,
    signal: Arc<ConsistencySignal>,
}

impl<T: Definition> TargetReset<T> {
    #[must_use]
    pub fn new(
        name: &'static str,
        target: ProvisioningTarget<T>,
        store: Arc<dyn Repository<T>>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        Self {
            name,
            target,
            store,
            signal,
        }
    }
}

#[async_trait]
impl<T: Definition> ResetStep for TargetReset<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self) -> Result<(), ProvisioningError> {
        self.target.delete_all().await?;
        self.store.delete_all().await.map_err(|err| {
            self.signal.notify_suspect(self.name, 1);
            ProvisioningError::from(err)
        })?;
        tracing::info!(step = self.name, kind = T::KIND, "target cleared");
        Ok(())
    }
}

/// Clears the local dictionary
pub struct LocalStoreReset {
    dictionary: Dictionary,
}

impl LocalStoreReset {
    pub const NAME: &'static str = "local_store";

    #[must_use]
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }
}

#[async_trait]
impl ResetStep for LocalStoreReset {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn apply(&self) -> Result<(), ProvisioningError> {
        self.dictionary.clear().await?;
        tracing::info!("local dictionary cleared");
        Ok(())
    }
}

/// Reset stand-in for a disabled target
#[derive(Debug, Clone, Copy)]
pub struct NoopReset {
    name: &'static str,
}

impl NoopReset {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl ResetStep for NoopReset {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self) -> Result<(), ProvisioningError> {
        tracing::info!(step = self.name, "target disabled, nothing to reset");
        Ok(())
    }
}

/// Timing and error count of one step after a reset run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    pub step: &'static str,
    pub errors: u64,
    pub elapsed_ms: u64,
}

/// Result of a successful reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub steps: Vec<StepTiming>,
    pub total_errors: u64,
    pub total_elapsed: Duration,
}

/// Ordered reset chain
pub struct ResetPipeline {
    steps: Vec<(Box<dyn ResetStep>, StepMeter)>,
    lifecycle: Arc<ProvisioningLifecycle>,
    signal: Arc<ConsistencySignal>,
}

impl ResetPipeline {
    #[must_use]
    pub fn new(
        steps: Vec<Box<dyn ResetStep>>,
        lifecycle: Arc<ProvisioningLifecycle>,
        signal: Arc<ConsistencySignal>,
    ) -> Self {
        let steps = steps
            .into_iter()
            .map(|step| {
                let meter = StepMeter::new(step.name());
                (step, meter)
            })
            .collect();
        Self {
            steps,
            lifecycle,
            signal,
        }
    }

    /// Meters in execution order
    pub fn meters(&self) -> impl Iterator<Item = &StepMeter> {
        self.steps.iter().map(|(_, meter)| meter)
    }

    /// Sum of every step's error counter
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.meters().map(StepMeter::errors).sum()
    }

    fn classify(&self, err: ProvisioningError) -> ProvisioningError {
        if err.is_state_transition() {
            self.signal.notify_suspect("lifecycle", 1);
            ProvisioningError::consistency_check(err)
        } else {
            err
        }
    }

    /// Run the chain
    ///
    /// The transition to `RESET` is checked before any step runs, so a
    /// rejected reset leaves every target untouched.
    ///
    /// # Errors
    /// Returns the failing step's error unchanged, or a consistency failure
    /// when the lifecycle rejects the transition to `RESET`.
    pub async fn run(&self) -> Result<ResetReport, ProvisioningError> {
        self.lifecycle
            .check(ProvisioningStatus::Reset)
            .await
            .map_err(|err| self.classify(err))?;

        let started = Instant::now();
        let mut failure = None;
        for (step, meter) in &self.steps {
            let step_started = Instant::now();
            let result = step.apply().await;
            let elapsed = step_started.elapsed();
            match result {
                Ok(()) => meter.record_success(elapsed),
                Err(err) => {
                    meter.record_failure(elapsed);
                    tracing::error!(step = step.name(), error = %err, "reset step failed");
                    failure = Some(err);
                    break;
                }
            }
        }

        let total_errors = self.total_errors();
        let total_elapsed = started.elapsed();
        telemetry::record_reset_totals(total_errors, total_elapsed);

        if let Some(err) = failure {
            return Err(err);
        }

        self.lifecycle
            .transition(ProvisioningStatus::Reset)
            .await
            .map_err(|err| self.classify(err))?;
        tracing::info!(
            elapsed_ms = u64::try_from(total_elapsed.as_millis()).unwrap_or(u64::MAX),
            "reset complete"
        );

        Ok(ResetReport {
            steps: self
                .meters()
                .map(|meter| StepTiming {
                    step: meter.step(),
                    errors: meter.errors(),
                    elapsed_ms: meter.elapsed_ms(),
                })
                .collect(),
            total_errors,
            total_elapsed,
        })
    }
}

impl std::fmt::Debug for ResetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.steps.iter().map(|(step, _)| step.name()).collect();
        f.debug_struct("ResetPipeline")
            .field("steps", &names)
            .finish_non_exhaustive()
    }
}
