//! Provisioning Model
//!
//! Typed definitions for the analytics configuration provisioned into
//! downstream services, and the desired-state model built from input
//! documents.
//!
//! # Core Concepts
//!
//! - [`Definition`]: Identity + value-equality contract used by diffing
//! - [`PmSchema`], [`PmDefinition`], [`KpiDefinition`], [`ProfileDefinition`],
//!   [`AugmentationDefinition`], [`IndexDefinition`]: the entity kinds
//! - [`PartialSubmission`]: one parsed input document
//! - [`ResourceSubmission`]: the desired state accumulated over one run
//! - [`ProvisioningState`]: persisted lifecycle record of a run
//!
//! # Example
//!
//! ```rust,ignore
//! use prov_model::{KpiDefinition, PartialSubmission, ResourceSubmission};
//!
//! let mut submission = ResourceSubmission::new();
//! submission.merge(&PartialSubmission::new().with_kpis(vec![
//!     KpiDefinition::new("drop_rate", "cell", "pmDrops / pmCalls").with_period(60),
//! ]));
//! assert_eq!(submission.kpi_definitions.len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod augmentation;
mod definition;
mod kpi;
mod pm;
mod profile;
mod state;
mod submission;

pub use augmentation::{AugmentationDefinition, AugmentationRule};
pub use definition::{keys_of, Definition};
pub use kpi::KpiDefinition;
pub use pm::{PmCounter, PmDefinition, PmDefinitionKey, PmSchema};
pub use profile::{IndexDefinition, ProfileDefinition};
pub use state::{ProvisioningState, ProvisioningStatus};
pub use submission::{DefinitionMap, PartialSubmission, ResourceSubmission};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
