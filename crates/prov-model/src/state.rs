//! Provisioning run state records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    /// Nothing provisioned yet
    Initial,
    /// A run is in progress
    Started,
    /// Last run finished successfully
    Completed,
    /// Last run failed
    Error,
    /// All provisioned state was torn down
    Reset,
}

impl ProvisioningStatus {
    /// All statuses, in declaration order
    pub const ALL: [ProvisioningStatus; 5] = [
        ProvisioningStatus::Initial,
        ProvisioningStatus::Started,
        ProvisioningStatus::Completed,
        ProvisioningStatus::Error,
        ProvisioningStatus::Reset,
    ];

    /// Whether entering this status closes the current run
    #[inline]
    #[must_use]
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Reset)
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Reset => "RESET",
        };
        f.write_str(s)
    }
}

/// Persisted state record of one provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningState {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub state: ProvisioningStatus,
}

impl ProvisioningState {
    /// Initial record used when nothing has been persisted yet
    #[must_use]
    pub fn initial() -> Self {
        Self {
            id: Uuid::nil(),
            start_time: Utc::now(),
            end_time: None,
            state: ProvisioningStatus::Initial,
        }
    }

    /// Open a new run in `STARTED`
    #[must_use]
    pub fn started() -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            state: ProvisioningStatus::Started,
        }
    }

    /// Successor record in `state`, keeping the run identity.
    ///
    /// Closing statuses stamp the end time.
    #[must_use]
    pub fn advance(&self, state: ProvisioningStatus) -> Self {
        let end_time = state.is_closing().then(Utc::now);
        Self {
            id: self.id,
            start_time: self.start_time,
            end_time,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_identity_and_closes() {
        let started = ProvisioningState::started();
        let done = started.advance(ProvisioningStatus::Completed);

        assert_eq!(done.id, started.id);
        assert_eq!(done.start_time, started.start_time);
        assert!(done.end_time.is_some());
        assert!(started.end_time.is_none());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&ProvisioningStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
        assert_eq!(ProvisioningStatus::Reset.to_string(), "RESET");
    }
}
