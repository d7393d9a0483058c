//! Error types for provisioning
//!
//! Provides the error taxonomy of a provisioning or reset run:
//! - Input load failures (fatal to the run)
//! - Validation failures (fatal, nothing sent downstream yet)
//! - Downstream failures, classified transient or permanent
//! - Local persistence failures
//! - Illegal lifecycle transitions, reclassified as consistency failures

use prov_reconcile::StateTransitionError;
use std::path::PathBuf;

/// Main provisioning error type
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// Input documents could not be loaded
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    /// Input documents are invalid
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Downstream service call failed
    #[error("downstream call failed: {0}")]
    Downstream(#[from] DownstreamError),

    /// Local store failed
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// Lifecycle transition rejected
    #[error("state transition failed: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// Persisted run state may not reflect reality
    #[error("consistency check failed: {source}")]
    ConsistencyCheck {
        /// The failure that exposed the inconsistency
        #[source]
        source: Box<ProvisioningError>,
    },

    /// Another provisioning or reset run holds the run lock
    #[error("a provisioning or reset run is already in progress")]
    RunInProgress,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ProvisioningError {
    /// Wrap an error as a consistency-check failure
    #[inline]
    #[must_use]
    pub fn consistency_check(source: ProvisioningError) -> Self {
        Self::ConsistencyCheck {
            source: Box::new(source),
        }
    }

    /// Check if error is a downstream failure worth retrying
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Downstream(e) if e.is_transient())
    }

    /// Check if error was reclassified as a consistency failure
    #[inline]
    #[must_use]
    pub fn is_consistency_failure(&self) -> bool {
        matches!(self, Self::ConsistencyCheck { .. })
    }

    /// Check if error is an illegal lifecycle transition
    #[inline]
    #[must_use]
    pub fn is_state_transition(&self) -> bool {
        matches!(self, Self::StateTransition(_))
    }
}

/// Input load errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Document could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be parsed
    #[error("parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Requested document does not exist
    #[error("document not found: {0}")]
    NotFound(PathBuf),
}

impl LoadError {
    /// Create parse error for path
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Definition validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A definition is malformed
    #[error("invalid {kind} '{name}': {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A definition references something the submission does not hold
    #[error("{kind} '{name}' references unknown {target_kind} '{target}'")]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        target_kind: &'static str,
        target: String,
    },
}

impl ValidationError {
    /// Create invalid-definition error
    pub fn invalid(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create unresolved-reference error
    pub fn unresolved(
        kind: &'static str,
        name: impl Into<String>,
        target_kind: &'static str,
        target: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            kind,
            name: name.into(),
            target_kind,
            target: target.into(),
        }
    }
}

/// Downstream call failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{target} {operation}: {kind}")]
pub struct DownstreamError {
    /// Target service
    pub target: &'static str,
    /// Client operation
    pub operation: &'static str,
    /// Failure classification
    pub kind: DownstreamErrorKind,
}

impl DownstreamError {
    /// Create downstream error
    #[inline]
    #[must_use]
    pub fn new(target: &'static str, operation: &'static str, kind: DownstreamErrorKind) -> Self {
        Self {
            target,
            operation,
            kind,
        }
    }

    /// Whether the call may succeed if retried (5xx, 429, connect, timeout)
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Classification of a downstream failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownstreamErrorKind {
    /// Non-success HTTP status
    #[error("status {code}: {message}")]
    Status { code: u16, message: String },

    /// Connection could not be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// Request timed out
    #[error("timed out")]
    Timeout,

    /// Anything else (serialization, protocol)
    #[error("{0}")]
    Other(String),
}

impl DownstreamErrorKind {
    /// Create status error
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { code, .. } => *code == 429 || (500..600).contains(code),
            Self::Connect(_) | Self::Timeout => true,
            Self::Other(_) => false,
        }
    }
}

/// Local store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{store}: {message}")]
pub struct PersistenceError {
    /// Store that failed
    pub store: &'static str,
    pub message: String,
}

impl PersistenceError {
    /// Create persistence error
    pub fn new(store: &'static str, message: impl Into<String>) -> Self {
        Self {
            store,
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are out of range
    #[error("invalid value: {0}")]
    Invalid(String),

    /// Builder is missing a collaborator
    #[error("missing collaborator: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use prov_model::ProvisioningStatus;

    #[test]
    fn transient_classification() {
        let transient = [
            DownstreamErrorKind::status(500, "boom"),
            DownstreamErrorKind::status(503, "unavailable"),
            DownstreamErrorKind::status(429, "slow down"),
            DownstreamErrorKind::Connect("refused".into()),
            DownstreamErrorKind::Timeout,
        ];
        for kind in transient {
            assert!(kind.is_transient(), "{kind} should be transient");
        }

        assert!(!DownstreamErrorKind::status(400, "bad").is_transient());
        assert!(!DownstreamErrorKind::status(404, "missing").is_transient());
        assert!(!DownstreamErrorKind::Other("decode".into()).is_transient());
    }

    #[test]
    fn provisioning_error_is_retryable() {
        let err: ProvisioningError =
            DownstreamError::new("kpi", "create", DownstreamErrorKind::Timeout).into();
        assert!(err.is_retryable());

        let err: ProvisioningError = PersistenceError::new("kpi", "disk full").into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn consistency_wrapper_keeps_source() {
        let transition = StateTransitionError {
            from: ProvisioningStatus::Started,
            to: ProvisioningStatus::Started,
        };
        let err = ProvisioningError::consistency_check(transition.into());

        assert!(err.is_consistency_failure());
        assert!(err.to_string().contains("STARTED -> STARTED"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError::unresolved("profile", "p1", "kpi", "missing");
        assert_eq!(
            err.to_string(),
            "profile 'p1' references unknown kpi 'missing'"
        );
    }
}
