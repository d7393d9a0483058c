//! Retry behaviour through the provisioner and TOML configuration

use prov_core::{
    ConfigError, DownstreamErrorKind, ProvisionerConfig, ProvisioningError, TargetMode,
};
use prov_model::ProvisioningStatus;
use prov_test_utils::{full_documents, Call, Harness};
use std::io::Write;

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .kpi_client
        .fail("create", 2, DownstreamErrorKind::status(503, "warming up"));

    harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap();

    let creates = harness
        .kpi_client
        .calls()
        .into_iter()
        .filter(|c| *c == Call::Create("drop_rate".into()))
        .count();
    assert_eq!(creates, 3);
    assert_eq!(harness.runtime_kpis.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_run() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .kpi_client
        .fail("create", 10, DownstreamErrorKind::Timeout);

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(harness.kpi_client.calls().len(), 3);
    assert_eq!(
        harness.states.statuses(),
        vec![ProvisioningStatus::Started, ProvisioningStatus::Error]
    );
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .augmentation_client
        .fail("create", 5, DownstreamErrorKind::status(422, "bad rule"));

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Downstream(_)));
    assert_eq!(harness.augmentation_client.calls().len(), 1);
    assert!(harness.kpi_client.calls().is_empty());
}

#[test]
fn config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
kpi_enabled = true

[retry]
max_attempts = 4
initial_backoff_ms = 100

[targets]
augmentation = "disabled"
index = "dry_run"
"#
    )
    .unwrap();

    let config = ProvisionerConfig::load(file.path()).unwrap();

    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.retry.policy().max_attempts, 4);
    assert_eq!(config.targets.augmentation, TargetMode::Disabled);
    assert_eq!(config.targets.index, TargetMode::DryRun);
    assert_eq!(config.kpi_mode(), TargetMode::Live);
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProvisionerConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[tokio::test]
async fn disabled_augmentation_target_from_config() {
    let config = ProvisionerConfig::from_toml_str("[targets]\naugmentation = \"disabled\"").unwrap();
    let harness = Harness::new(config);

    harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap();

    assert!(harness.augmentation_client.calls().is_empty());
    assert!(harness.runtime_augmentations.is_empty());
    assert_eq!(harness.kpi_client.mutations().len(), 2);
}
