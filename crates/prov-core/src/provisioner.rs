//! Provisioner entry point
//!
//! [`Provisioner`] ties loader, aggregator, provisioning pipeline and reset
//! pipeline together. Runs are serialized by a run lock: a second
//! provisioning or reset request while one is in flight is refused with
//! [`ProvisioningError::RunInProgress`].
//!
//! # Example
//!
//! ```rust,ignore
//! let provisioner = Provisioner::builder(ProvisionerConfig::load("provisioner.toml")?)
//!     .loader(loader)
//!     .dictionary(dictionary)
//!     .runtime_stores(runtime)
//!     .clients(clients)
//!     .state_store(state_store)
//!     .build()?;
//!
//! provisioner.recover().await?;
//! provisioner.provision().await?;
//! ```

use crate::aggregator::ResourceAggregator;
use crate::collaborators::{
    DownstreamClient, FaultHandler, InputLoader, Repository, StateStore, TracingFaultHandler,
    Validator,
};
use crate::config::ProvisionerConfig;
use crate::context::RunContext;
use crate::dictionary::Dictionary;
use crate::error::{ConfigError, ProvisioningError};
use crate::lifecycle::ProvisioningLifecycle;
use crate::pipeline::{
    AugmentationHandler, DictionaryStep, DisabledStep, IndexHandler, KpiHandler, PipelineReport,
    ProvisioningContext, ProvisioningPipeline, ProvisioningStep, StepReport,
};
use crate::reset::{LocalStoreReset, NoopReset, ResetPipeline, ResetReport, ResetStep, TargetReset};
use crate::target::ProvisioningTarget;
use crate::telemetry;
use crate::validation::ReferenceValidator;
use prov_model::{
    AugmentationDefinition, IndexDefinition, KpiDefinition, PartialSubmission, ProvisioningState,
    ProvisioningStatus,
};
use prov_reconcile::ConsistencySignal;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stores recording what each downstream target holds
#[derive(Clone)]
pub struct RuntimeStores {
    pub augmentations: Arc<dyn Repository<AugmentationDefinition>>,
    pub kpis: Arc<dyn Repository<KpiDefinition>>,
    pub indexes: Arc<dyn Repository<IndexDefinition>>,
}

/// Clients of the downstream services
#[derive(Clone)]
pub struct DownstreamClients {
    pub augmentation: Arc<dyn DownstreamClient<AugmentationDefinition>>,
    pub kpi: Arc<dyn DownstreamClient<KpiDefinition>>,
    pub index: Arc<dyn DownstreamClient<IndexDefinition>>,
}

/// Result of a provisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    /// Nothing changed; downstream state was pushed again
    Reasserted { steps: Vec<StepReport> },
    /// A provisioning run completed
    Provisioned {
        report: PipelineReport,
        affected_profiles: BTreeSet<String>,
    },
}

impl ProvisioningOutcome {
    #[inline]
    #[must_use]
    pub fn is_reassert(&self) -> bool {
        matches!(self, Self::Reasserted { .. })
    }
}

/// Provisioning orchestrator
pub struct Provisioner {
    loader: Arc<dyn InputLoader>,
    aggregator: ResourceAggregator,
    pipeline: ProvisioningPipeline,
    reset: ResetPipeline,
    lifecycle: Arc<ProvisioningLifecycle>,
    signal: Arc<ConsistencySignal>,
    faults: Arc<dyn FaultHandler>,
    run_context: RunContext,
    run_lock: Mutex<()>,
}

impl Provisioner {
    /// Start building a provisioner
    #[must_use]
    pub fn builder(config: ProvisionerConfig) -> ProvisionerBuilder {
        ProvisionerBuilder::new(config)
    }

    /// Inspect the persisted lifecycle at startup
    ///
    /// A run left in `STARTED` was interrupted; it is reported and left for
    /// the next run, which starts a fresh one.
    ///
    /// # Errors
    /// A store failure is passed to [`FaultHandler::fatal`] and returned.
    pub async fn recover(&self) -> Result<ProvisioningState, ProvisioningError> {
        let current = match self.lifecycle.current().await {
            Ok(current) => current,
            Err(err) => {
                let err = ProvisioningError::from(err);
                self.faults.fatal(&err);
                return Err(err);
            }
        };
        if current.state == ProvisioningStatus::Started {
            tracing::warn!(
                run_id = %current.id,
                started = %current.start_time,
                "previous provisioning run was interrupted"
            );
        } else {
            tracing::info!(run_id = %current.id, state = %current.state, "provisioning state recovered");
        }
        Ok(current)
    }

    /// Load every document and provision
    ///
    /// # Errors
    /// See [`provision_documents`](Self::provision_documents); load failures
    /// are returned as [`ProvisioningError::Load`].
    pub async fn provision(&self) -> Result<ProvisioningOutcome, ProvisioningError> {
        let _guard = self.lock()?;
        let documents = self.loader.load_ordered().await.map_err(|err| self.load_failed(err))?;
        self.run(documents).await
    }

    /// Load one document and provision it on its own
    ///
    /// # Errors
    /// As [`provision`](Self::provision).
    pub async fn provision_path(&self, path: &Path) -> Result<ProvisioningOutcome, ProvisioningError> {
        let _guard = self.lock()?;
        let document = self.loader.load_one(path).await.map_err(|err| self.load_failed(err))?;
        self.run(vec![document]).await
    }

    /// Provision already loaded documents, in order
    ///
    /// # Errors
    /// Returns [`ProvisioningError::RunInProgress`] if another run holds the
    /// lock, otherwise the first validation, downstream, persistence or
    /// consistency failure.
    pub async fn provision_documents(
        &self,
        documents: Vec<PartialSubmission>,
    ) -> Result<ProvisioningOutcome, ProvisioningError> {
        let _guard = self.lock()?;
        self.run(documents).await
    }

    /// Tear down everything provisioned
    ///
    /// # Errors
    /// Returns [`ProvisioningError::RunInProgress`] or the failing step's error.
    pub async fn reset(&self) -> Result<ResetReport, ProvisioningError> {
        let _guard = self.lock()?;
        self.reset.run().await.map_err(|err| {
            self.faults.error("reset failed", &err);
            err
        })
    }

    /// Consistency signal used by this provisioner
    #[must_use]
    pub fn signal(&self) -> &Arc<ConsistencySignal> {
        &self.signal
    }

    #[must_use]
    pub fn lifecycle(&self) -> &ProvisioningLifecycle {
        &self.lifecycle
    }

    #[must_use]
    pub fn reset_pipeline(&self) -> &ResetPipeline {
        &self.reset
    }

    /// Provisioning step names in execution order
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.pipeline.step_names()
    }

    fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, ProvisioningError> {
        self.run_lock.try_lock().map_err(|_| {
            tracing::warn!("run requested while another is in progress");
            ProvisioningError::RunInProgress
        })
    }

    fn load_failed(&self, err: crate::error::LoadError) -> ProvisioningError {
        metrics::counter!(telemetry::LOAD_ERRORS).increment(1);
        let err = ProvisioningError::from(err);
        self.faults.error("input documents could not be loaded", &err);
        err
    }

    async fn run(
        &self,
        documents: Vec<PartialSubmission>,
    ) -> Result<ProvisioningOutcome, ProvisioningError> {
        self.run_context.reset();
        let mut aggregation = self
            .aggregator
            .aggregate(&self.run_context, documents)
            .await
            .map_err(|err| {
                self.faults.error("aggregation failed", &err);
                err
            })?;
        let pending = self
            .pipeline
            .pending(&aggregation.submission)
            .await
            .map_err(|err| {
                self.faults.error("provisioned state could not be read", &err);
                err
            })?;
        aggregation.absorb_pending(pending);

        if aggregation.is_unchanged() {
            tracing::info!("no definition changes, re-asserting downstream state");
            let steps = self.pipeline.reassert().await.map_err(|err| {
                self.faults.error("re-assert failed", &err);
                err
            })?;
            return Ok(ProvisioningOutcome::Reasserted { steps });
        }

        let ctx = ProvisioningContext {
            submission: &aggregation.submission,
            dictionary_delta: &aggregation.dictionary_delta,
            affected_profiles: &aggregation.affected_profiles,
        };
        let report = self.pipeline.run(&ctx).await.map_err(|err| {
            self.faults.error("provisioning run failed", &err);
            err
        })?;
        Ok(ProvisioningOutcome::Provisioned {
            report,
            affected_profiles: aggregation.affected_profiles,
        })
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("pipeline", &self.pipeline)
            .field("reset", &self.reset)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Provisioner`]
pub struct ProvisionerBuilder {
    config: ProvisionerConfig,
    loader: Option<Arc<dyn InputLoader>>,
    validator: Option<Arc<dyn Validator>>,
    dictionary: Option<Dictionary>,
    runtime: Option<RuntimeStores>,
    clients: Option<DownstreamClients>,
    state_store: Option<Arc<dyn StateStore>>,
    signal: Option<Arc<ConsistencySignal>>,
    faults: Option<Arc<dyn FaultHandler>>,
}

impl ProvisionerBuilder {
    #[must_use]
    pub fn new(config: ProvisionerConfig) -> Self {
        Self {
            config,
            loader: None,
            validator: None,
            dictionary: None,
            runtime: None,
            clients: None,
            state_store: None,
            signal: None,
            faults: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn InputLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Override the default [`ReferenceValidator`]
    #[inline]
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[inline]
    #[must_use]
    pub fn dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    #[inline]
    #[must_use]
    pub fn runtime_stores(mut self, runtime: RuntimeStores) -> Self {
        self.runtime = Some(runtime);
        self
    }

    #[inline]
    #[must_use]
    pub fn clients(mut self, clients: DownstreamClients) -> Self {
        self.clients = Some(clients);
        self
    }

    #[inline]
    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Use a dedicated signal instead of the process-wide one
    #[inline]
    #[must_use]
    pub fn signal(mut self, signal: Arc<ConsistencySignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    #[inline]
    #[must_use]
    pub fn fault_handler(mut self, faults: Arc<dyn FaultHandler>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Assemble the provisioner
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] for an absent collaborator or
    /// [`ConfigError::Invalid`] for out-of-range configuration.
    pub fn build(self) -> Result<Provisioner, ProvisioningError> {
        self.config.validate()?;
        let loader = self.loader.ok_or(ConfigError::Missing("loader"))?;
        let dictionary = self.dictionary.ok_or(ConfigError::Missing("dictionary"))?;
        let runtime = self.runtime.ok_or(ConfigError::Missing("runtime stores"))?;
        let clients = self.clients.ok_or(ConfigError::Missing("downstream clients"))?;
        let state_store = self.state_store.ok_or(ConfigError::Missing("state store"))?;
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(ReferenceValidator::new()));
        let signal = self.signal.unwrap_or_else(ConsistencySignal::global);
        let faults = self
            .faults
            .unwrap_or_else(|| Arc::new(TracingFaultHandler));

        let config = &self.config;
        let policy = config.retry.policy();
        let lifecycle = Arc::new(ProvisioningLifecycle::new(state_store));

        let mut steps: Vec<Arc<dyn ProvisioningStep>> = Vec::with_capacity(4);
        let mut resets: Vec<Box<dyn ResetStep>> = Vec::with_capacity(4);

        match ProvisioningTarget::for_mode(
            KpiHandler::NAME,
            config.kpi_mode(),
            Arc::clone(&clients.kpi),
            &policy,
        ) {
            Some(target) => resets.push(Box::new(TargetReset::new(
                KpiHandler::NAME,
                target,
                Arc::clone(&runtime.kpis),
                Arc::clone(&signal),
            ))),
            None => resets.push(Box::new(NoopReset::new(KpiHandler::NAME))),
        }
        match ProvisioningTarget::for_mode(
            AugmentationHandler::NAME,
            config.targets.augmentation,
            Arc::clone(&clients.augmentation),
            &policy,
        ) {
            Some(target) => resets.push(Box::new(TargetReset::new(
                AugmentationHandler::NAME,
                target,
                Arc::clone(&runtime.augmentations),
                Arc::clone(&signal),
            ))),
            None => resets.push(Box::new(NoopReset::new(AugmentationHandler::NAME))),
        }
        match ProvisioningTarget::for_mode(
            IndexHandler::NAME,
            config.targets.index,
            Arc::clone(&clients.index),
            &policy,
        ) {
            Some(target) => resets.push(Box::new(TargetReset::new(
                IndexHandler::NAME,
                target,
                Arc::clone(&runtime.indexes),
                Arc::clone(&signal),
            ))),
            None => resets.push(Box::new(NoopReset::new(IndexHandler::NAME))),
        }
        resets.push(Box::new(LocalStoreReset::new(dictionary.clone())));

        match ProvisioningTarget::for_mode(
            AugmentationHandler::NAME,
            config.targets.augmentation,
            clients.augmentation,
            &policy,
        ) {
            Some(target) => steps.push(Arc::new(AugmentationHandler::new(
                target,
                Arc::clone(&runtime.augmentations),
                Arc::clone(&signal),
            ))),
            None => steps.push(Arc::new(DisabledStep::new(AugmentationHandler::NAME))),
        }
        match ProvisioningTarget::for_mode(KpiHandler::NAME, config.kpi_mode(), clients.kpi, &policy)
        {
            Some(target) => steps.push(Arc::new(KpiHandler::new(
                target,
                Arc::clone(&runtime.kpis),
                Arc::clone(&signal),
            ))),
            None => steps.push(Arc::new(DisabledStep::new(KpiHandler::NAME))),
        }
        match ProvisioningTarget::for_mode(
            IndexHandler::NAME,
            config.targets.index,
            clients.index,
            &policy,
        ) {
            Some(target) => steps.push(Arc::new(IndexHandler::new(
                target,
                Arc::clone(&runtime.indexes),
                Arc::clone(&runtime.kpis),
                Arc::clone(&signal),
            ))),
            None => steps.push(Arc::new(DisabledStep::new(IndexHandler::NAME))),
        }
        steps.push(Arc::new(DictionaryStep::new(
            dictionary.clone(),
            Arc::clone(&signal),
        )));

        tracing::info!(
            kpi = ?config.kpi_mode(),
            augmentation = ?config.targets.augmentation,
            index = ?config.targets.index,
            max_attempts = policy.max_attempts,
            "provisioner assembled"
        );

        Ok(Provisioner {
            loader,
            aggregator: ResourceAggregator::new(validator, dictionary),
            pipeline: ProvisioningPipeline::new(steps, Arc::clone(&lifecycle), Arc::clone(&signal)),
            reset: ResetPipeline::new(resets, Arc::clone(&lifecycle), Arc::clone(&signal)),
            lifecycle,
            signal,
            faults,
            run_context: RunContext::new(),
            run_lock: Mutex::new(()),
        })
    }
}
