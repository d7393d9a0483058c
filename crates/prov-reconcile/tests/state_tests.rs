use prov_model::ProvisioningStatus;
use prov_reconcile::{allowed_transitions, validate_transition};
use proptest::prelude::*;

#[test]
fn test_initial_transitions() {
    assert!(validate_transition(ProvisioningStatus::Initial, ProvisioningStatus::Started).is_ok());
    assert!(validate_transition(ProvisioningStatus::Initial, ProvisioningStatus::Reset).is_ok());

    // Invalid
    assert!(validate_transition(ProvisioningStatus::Initial, ProvisioningStatus::Completed).is_err());
    assert!(validate_transition(ProvisioningStatus::Initial, ProvisioningStatus::Error).is_err());
}

#[test]
fn test_reset_only_restarts() {
    assert!(validate_transition(ProvisioningStatus::Reset, ProvisioningStatus::Started).is_ok());

    assert!(validate_transition(ProvisioningStatus::Reset, ProvisioningStatus::Error).is_err());
    assert!(validate_transition(ProvisioningStatus::Reset, ProvisioningStatus::Completed).is_err());
}

#[test]
fn test_started_is_not_reentrant() {
    assert!(validate_transition(ProvisioningStatus::Started, ProvisioningStatus::Started).is_err());
    assert!(validate_transition(ProvisioningStatus::Started, ProvisioningStatus::Completed).is_ok());
    assert!(validate_transition(ProvisioningStatus::Started, ProvisioningStatus::Error).is_ok());
    assert!(validate_transition(ProvisioningStatus::Started, ProvisioningStatus::Reset).is_ok());
}

#[test]
fn test_full_table() {
    use ProvisioningStatus::*;
    let legal = [
        (Initial, Started),
        (Initial, Reset),
        (Started, Completed),
        (Started, Error),
        (Started, Reset),
        (Completed, Started),
        (Completed, Reset),
        (Error, Started),
        (Error, Reset),
        (Reset, Started),
    ];

    let mut accepted = 0;
    for from in ProvisioningStatus::ALL {
        for to in ProvisioningStatus::ALL {
            let ok = validate_transition(from, to).is_ok();
            assert_eq!(ok, legal.contains(&(from, to)), "{from} -> {to}");
            if ok {
                accepted += 1;
            }
        }
    }
    assert_eq!(accepted, legal.len());
}

fn any_status() -> impl Strategy<Value = ProvisioningStatus> {
    prop_oneof![
        Just(ProvisioningStatus::Initial),
        Just(ProvisioningStatus::Started),
        Just(ProvisioningStatus::Completed),
        Just(ProvisioningStatus::Error),
        Just(ProvisioningStatus::Reset),
    ]
}

proptest! {
    #[test]
    fn prop_validation_agrees_with_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }
}
