//! Downstream target wrappers
//!
//! A [`ProvisioningTarget`] is what handlers talk to. In live mode it
//! forwards to the real client through a [`RetryingClient`]; in dry-run mode
//! it logs each call and reports success, so local bookkeeping still runs.

use crate::collaborators::DownstreamClient;
use crate::config::TargetMode;
use crate::error::DownstreamError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use prov_model::Definition;
use std::fmt;
use std::sync::Arc;

/// Client decorator that retries transient failures
pub struct RetryingClient<T: Definition> {
    inner: Arc<dyn DownstreamClient<T>>,
    policy: RetryPolicy,
}

impl<T: Definition> RetryingClient<T> {
    #[must_use]
    pub fn new(inner: Arc<dyn DownstreamClient<T>>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: Definition> DownstreamClient<T> for RetryingClient<T> {
    async fn create(&self, item: &T) -> Result<(), DownstreamError> {
        self.policy.run(|| self.inner.create(item)).await
    }

    async fn update(&self, item: &T) -> Result<(), DownstreamError> {
        self.policy.run(|| self.inner.update(item)).await
    }

    async fn delete(&self, item: &T) -> Result<(), DownstreamError> {
        self.policy.run(|| self.inner.delete(item)).await
    }

    async fn delete_all(&self) -> Result<(), DownstreamError> {
        self.policy.run(|| self.inner.delete_all()).await
    }

    async fn get_all(&self) -> Result<Vec<T>, DownstreamError> {
        self.policy.run(|| self.inner.get_all()).await
    }

    async fn reassert(&self, items: &[T]) -> Result<(), DownstreamError> {
        self.policy.run(|| self.inner.reassert(items)).await
    }
}

/// Downstream target as seen by a handler
pub enum ProvisioningTarget<T: Definition> {
    /// Real service behind retries
    Live(Arc<dyn DownstreamClient<T>>),
    /// Calls are logged and succeed without side effects
    DryRun {
        /// Target name used in logs
        target: &'static str,
    },
}

impl<T: Definition> ProvisioningTarget<T> {
    /// Build the target for `mode`; `None` when the target is disabled
    #[must_use]
    pub fn for_mode(
        target: &'static str,
        mode: TargetMode,
        client: Arc<dyn DownstreamClient<T>>,
        policy: &RetryPolicy,
    ) -> Option<Self> {
        match mode {
            TargetMode::Live => Some(Self::Live(Arc::new(RetryingClient::new(
                client,
                policy.clone(),
            )))),
            TargetMode::DryRun => {
                tracing::info!(target_service = target, "downstream target in dry-run mode");
                Some(Self::DryRun { target })
            }
            TargetMode::Disabled => {
                tracing::info!(target_service = target, "downstream target disabled");
                None
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun { .. })
    }
}

impl<T: Definition> fmt::Debug for ProvisioningTarget<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::DryRun { target } => f.debug_struct("DryRun").field("target", target).finish(),
        }
    }
}

#[async_trait]
impl<T: Definition> DownstreamClient<T> for ProvisioningTarget<T> {
    async fn create(&self, item: &T) -> Result<(), DownstreamError> {
        match self {
            Self::Live(client) => client.create(item).await,
            Self::DryRun { target } => {
                tracing::info!(target_service = *target, kind = T::KIND, key = %item.key(), "dry-run create");
                Ok(())
            }
        }
    }

    async fn update(&self, item: &T) -> Result<(), DownstreamError> {
        match self {
            Self::Live(client) => client.update(item).await,
            Self::DryRun { target } => {
                tracing::info!(target_service = *target, kind = T::KIND, key = %item.key(), "dry-run update");
                Ok(())
            }
        }
    }

    async fn delete(&self, item: &T) -> Result<(), DownstreamError> {
        match self {
            Self::Live(client) => client.delete(item).await,
            Self::DryRun { target } => {
                tracing::info!(target_service = *target, kind = T::KIND, key = %item.key(), "dry-run delete");
                Ok(())
            }
        }
    }

    async fn delete_all(&self) -> Result<(), DownstreamError> {
        match self {
            Self::Live(client) => client.delete_all().await,
            Self::DryRun { target } => {
                tracing::info!(target_service = *target, kind = T::KIND, "dry-run delete all");
                Ok(())
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<T>, DownstreamError> {
        match self {
            Self::Live(client) => client.get_all().await,
            Self::DryRun { .. } => Ok(Vec::new()),
        }
    }

    async fn reassert(&self, items: &[T]) -> Result<(), DownstreamError> {
        match self {
            Self::Live(client) => client.reassert(items).await,
            Self::DryRun { target } => {
                tracing::info!(
                    target_service = *target,
                    kind = T::KIND,
                    count = items.len(),
                    "dry-run reassert"
                );
                Ok(())
            }
        }
    }
}
