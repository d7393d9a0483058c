//! Persisted run lifecycle
//!
//! Every transition is validated against the closed transition table and
//! then appended to the [`StateStore`]. Entering `STARTED` opens a new run
//! with a fresh id; every other transition advances the current run.

use crate::collaborators::StateStore;
use crate::error::{PersistenceError, ProvisioningError};
use prov_model::{ProvisioningState, ProvisioningStatus};
use prov_reconcile::validate_transition;
use std::sync::Arc;

/// Lifecycle of provisioning runs backed by a state store
pub struct ProvisioningLifecycle {
    store: Arc<dyn StateStore>,
}

impl ProvisioningLifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Current record; [`ProvisioningState::initial`] if none was persisted
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when the store cannot be read.
    pub async fn current(&self) -> Result<ProvisioningState, PersistenceError> {
        Ok(self
            .store
            .current()
            .await?
            .unwrap_or_else(ProvisioningState::initial))
    }

    /// Whether a transition to `to` is legal right now; nothing is written
    ///
    /// # Errors
    /// As [`transition`](Self::transition).
    pub async fn check(&self, to: ProvisioningStatus) -> Result<(), ProvisioningError> {
        let current = self.current().await?;
        validate_transition(current.state, to)?;
        Ok(())
    }

    /// Validate and persist a transition to `to`
    ///
    /// # Errors
    /// Returns [`ProvisioningError::StateTransition`] for an illegal
    /// transition (nothing is written) or
    /// [`ProvisioningError::Persistence`] if the store fails.
    pub async fn transition(
        &self,
        to: ProvisioningStatus,
    ) -> Result<ProvisioningState, ProvisioningError> {
        let current = self.current().await?;
        validate_transition(current.state, to)?;

        let next = if to == ProvisioningStatus::Started {
            ProvisioningState::started()
        } else {
            current.advance(to)
        };
        self.store.append(&next).await?;

        tracing::info!(run_id = %next.id, from = %current.state, to = %to, "provisioning state changed");
        Ok(next)
    }

    /// All persisted records, oldest first
    ///
    /// # Errors
    /// Returns [`PersistenceError`] when the store cannot be read.
    pub async fn history(&self) -> Result<Vec<ProvisioningState>, PersistenceError> {
        self.store.history().await
    }
}

impl std::fmt::Debug for ProvisioningLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningLifecycle").finish_non_exhaustive()
    }
}
