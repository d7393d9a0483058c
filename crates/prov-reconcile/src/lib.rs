//! Provisioning Reconciliation Primitives
//!
//! In-memory building blocks shared by every provisioning target:
//!
//! - [`DiffEngine`]: minimal added / updated / deleted deltas between an
//!   existing snapshot and a candidate collection
//! - [`validate_transition`]: the closed lifecycle transition table of a
//!   provisioning run
//! - [`ConsistencySignal`]: counter and event channel for suspected
//!   divergence between downstream services and local bookkeeping
//!
//! # Example
//!
//! ```rust,ignore
//! use prov_reconcile::DiffEngine;
//!
//! let engine = DiffEngine::of(provisioned_kpis);
//! let delta = engine.diff(&desired_kpis);
//! for kpi in &delta.added {
//!     client.create(kpi).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod diff;
pub mod signal;
pub mod state_machine;

pub use diff::{Delta, DiffEngine};
pub use signal::{ConsistencySignal, SuspectEvent, SUSPECT_COUNTER};
pub use state_machine::{allowed_transitions, validate_transition, StateTransitionError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
