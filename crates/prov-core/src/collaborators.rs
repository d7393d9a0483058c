//! Collaborator seams of the provisioner
//!
//! The provisioner owns orchestration only. Document loading, validation,
//! downstream services, and local stores sit behind the traits below so
//! that deployments plug in real implementations and tests plug in fakes.

use crate::context::ValidPmDefinitions;
use crate::error::{
    DownstreamError, LoadError, PersistenceError, ProvisioningError, ValidationError,
};
use async_trait::async_trait;
use prov_model::{
    AugmentationDefinition, Definition, PartialSubmission, PmDefinition, ProvisioningState,
    ResourceSubmission,
};
use std::path::Path;

/// Source of input documents
#[async_trait]
pub trait InputLoader: Send + Sync {
    /// Load every document in application order
    async fn load_ordered(&self) -> Result<Vec<PartialSubmission>, LoadError>;

    /// Load a single document
    async fn load_one(&self, path: &Path) -> Result<PartialSubmission, LoadError>;
}

/// Definition validation rules
///
/// Validation runs against the cumulative submission, so a document may
/// reference definitions introduced by earlier documents.
pub trait Validator: Send + Sync {
    /// Validate augmentations declared by one document
    ///
    /// # Errors
    /// Returns [`ValidationError`] on the first invalid augmentation.
    fn validate_augmentations(
        &self,
        augmentations: &[AugmentationDefinition],
        submission: &ResourceSubmission,
    ) -> Result<(), ValidationError>;

    /// Validate every KPI in the submission
    ///
    /// # Errors
    /// Returns [`ValidationError`] on the first invalid KPI.
    fn validate_kpi_definitions(&self, submission: &ResourceSubmission)
        -> Result<(), ValidationError>;

    /// Validate every profile in the submission
    ///
    /// # Errors
    /// Returns [`ValidationError`] on the first invalid profile.
    fn validate_profile_definitions(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<(), ValidationError>;

    /// Valid subset of `candidates`, grouped by schema and ordered by name
    ///
    /// Invalid PM definitions are dropped, not rejected.
    fn valid_pm_definitions(
        &self,
        candidates: &[PmDefinition],
        submission: &ResourceSubmission,
    ) -> ValidPmDefinitions;
}

/// Client of one downstream service holding definitions of kind `T`
#[async_trait]
pub trait DownstreamClient<T: Definition>: Send + Sync {
    async fn create(&self, item: &T) -> Result<(), DownstreamError>;

    async fn update(&self, item: &T) -> Result<(), DownstreamError>;

    async fn delete(&self, item: &T) -> Result<(), DownstreamError>;

    /// Remove everything this service holds
    async fn delete_all(&self) -> Result<(), DownstreamError>;

    /// What the service currently holds
    async fn get_all(&self) -> Result<Vec<T>, DownstreamError>;

    /// Push `items` again regardless of what the service reports
    async fn reassert(&self, items: &[T]) -> Result<(), DownstreamError> {
        for item in items {
            self.update(item).await?;
        }
        Ok(())
    }
}

/// Local store of definitions of kind `T`
#[async_trait]
pub trait Repository<T: Definition>: Send + Sync {
    async fn find_all(&self) -> Result<Vec<T>, PersistenceError>;

    async fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistenceError>;

    /// Insert or replace by identity key
    async fn save(&self, item: &T) -> Result<(), PersistenceError>;

    async fn delete(&self, key: &T::Key) -> Result<(), PersistenceError>;

    async fn delete_all(&self) -> Result<(), PersistenceError>;
}

/// Append-only store of lifecycle records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Most recent record, if any
    async fn current(&self) -> Result<Option<ProvisioningState>, PersistenceError>;

    async fn append(&self, state: &ProvisioningState) -> Result<(), PersistenceError>;

    /// All records, oldest first
    async fn history(&self) -> Result<Vec<ProvisioningState>, PersistenceError>;
}

/// Sink for failures the caller cannot handle locally
pub trait FaultHandler: Send + Sync {
    /// Failure that must halt startup
    fn fatal(&self, error: &ProvisioningError);

    /// Failure that aborts one run
    fn error(&self, message: &str, error: &ProvisioningError);
}

/// Fault handler that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFaultHandler;

impl FaultHandler for TracingFaultHandler {
    fn fatal(&self, error: &ProvisioningError) {
        tracing::error!(error = %error, fatal = true, "provisioner cannot continue");
    }

    fn error(&self, message: &str, error: &ProvisioningError) {
        tracing::error!(error = %error, "{message}");
    }
}
