//! Provisioning run lifecycle transitions
//!
//! The transition table is closed: any pair not listed by
//! [`allowed_transitions`] is rejected. No status transitions to itself and
//! `Initial` is never a destination.

use prov_model::ProvisioningStatus;

/// Rejected lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal provisioning state transition: {from} -> {to}")]
pub struct StateTransitionError {
    /// Status the run was in
    pub from: ProvisioningStatus,
    /// Status that was requested
    pub to: ProvisioningStatus,
}

/// Validates a state transition.
///
/// # Errors
/// Returns [`StateTransitionError`] when `to` is not a legal successor of `from`.
pub fn validate_transition(
    from: ProvisioningStatus,
    to: ProvisioningStatus,
) -> Result<(), StateTransitionError> {
    if allowed(from, to) {
        Ok(())
    } else {
        tracing::debug!(%from, %to, "rejected provisioning state transition");
        Err(StateTransitionError { from, to })
    }
}

/// Legal successors of `from`
#[must_use]
pub fn allowed_transitions(from: ProvisioningStatus) -> Vec<ProvisioningStatus> {
    use ProvisioningStatus::*;
    match from {
        Initial => vec![Started, Reset],
        Started => vec![Completed, Error, Reset],
        Completed => vec![Started, Reset],
        Error => vec![Started, Reset],
        Reset => vec![Started],
    }
}

fn allowed(from: ProvisioningStatus, to: ProvisioningStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProvisioningStatus::*;

    #[test]
    fn initial_is_never_a_destination() {
        for from in ProvisioningStatus::ALL {
            assert!(validate_transition(from, Initial).is_err());
        }
    }

    #[test]
    fn no_self_transitions() {
        for status in ProvisioningStatus::ALL {
            assert!(validate_transition(status, status).is_err());
        }
    }

    #[test]
    fn error_reports_both_ends() {
        let err = validate_transition(Reset, Error).unwrap_err();
        assert_eq!(err, StateTransitionError { from: Reset, to: Error });
        assert!(err.to_string().contains("RESET -> ERROR"));
    }
}
