//! Provisioning Orchestrator
//!
//! Turns declarative PM, KPI, profile and augmentation documents into
//! provisioned resources in three downstream services (augmentation
//! service, KPI calculator, indexer), and tears them down again on request.
//!
//! # Core Concepts
//!
//! - **Aggregation**: documents are merged in order into one desired state
//!   and validated against it ([`aggregator`])
//! - **Provisioning pipeline**: ordered steps that reconcile each target
//!   with the desired state inside one lifecycle run ([`pipeline`])
//! - **Reset pipeline**: fail-fast teardown with per-step meters ([`reset`])
//! - **Target modes**: each target is live (with retries), dry-run or
//!   disabled ([`config`], [`target`])
//! - **Consistency suspects**: a local write that fails after a downstream
//!   call succeeded is flagged on the [`ConsistencySignal`](prov_reconcile::ConsistencySignal)
//!
//! # Example
//!
//! ```rust,ignore
//! use prov_core::{Provisioner, ProvisionerConfig};
//!
//! let provisioner = Provisioner::builder(ProvisionerConfig::default())
//!     .loader(loader)
//!     .dictionary(dictionary)
//!     .runtime_stores(runtime)
//!     .clients(clients)
//!     .state_store(states)
//!     .build()?;
//!
//! match provisioner.provision().await? {
//!     ProvisioningOutcome::Reasserted { .. } => println!("nothing changed"),
//!     ProvisioningOutcome::Provisioned { report, .. } => println!("run {}", report.run_id),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod aggregator;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod dictionary;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod provisioner;
pub mod reset;
pub mod retry;
pub mod target;
pub mod telemetry;
pub mod validation;

pub use aggregator::{Aggregation, ResourceAggregator};
pub use collaborators::{
    DownstreamClient, FaultHandler, InputLoader, Repository, StateStore, TracingFaultHandler,
    Validator,
};
pub use config::{ProvisionerConfig, RetryConfig, TargetMode, TargetModes};
pub use context::{RunContext, ValidPmDefinitions};
pub use dictionary::{Dictionary, DictionaryDelta};
pub use error::{
    ConfigError, DownstreamError, DownstreamErrorKind, LoadError, PersistenceError,
    ProvisioningError, ValidationError,
};
pub use lifecycle::ProvisioningLifecycle;
pub use pipeline::{
    PendingChanges, PipelineReport, ProvisioningContext, ProvisioningPipeline, ProvisioningStep,
    Rollback, StepReport,
};
pub use provisioner::{
    DownstreamClients, Provisioner, ProvisionerBuilder, ProvisioningOutcome, RuntimeStores,
};
pub use reset::{ResetPipeline, ResetReport, ResetStep, StepTiming};
pub use retry::RetryPolicy;
pub use target::{ProvisioningTarget, RetryingClient};
pub use telemetry::StepMeter;
pub use validation::ReferenceValidator;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
