//! End-to-end provisioning runs against in-memory collaborators

use pretty_assertions::assert_eq;
use prov_core::{
    DownstreamClient, ProvisionerConfig, ProvisioningError, ProvisioningOutcome, TargetMode, TargetModes,
};
use prov_model::{KpiDefinition, PartialSubmission, ProfileDefinition, ProvisioningStatus};
use prov_test_utils::{
    definitions_document, document, full_documents, schema_document, Call, Harness,
    InMemoryStateStore,
};
use std::collections::BTreeSet;
use std::path::Path;

fn provisioned(outcome: ProvisioningOutcome) -> (prov_core::PipelineReport, BTreeSet<String>) {
    match outcome {
        ProvisioningOutcome::Provisioned {
            report,
            affected_profiles,
        } => (report, affected_profiles),
        ProvisioningOutcome::Reasserted { .. } => panic!("expected a provisioning run"),
    }
}

#[tokio::test]
async fn first_run_provisions_every_target() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());

    let (report, affected) = provisioned(harness.provisioner.provision().await.unwrap());

    let steps: Vec<_> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(steps, vec!["augmentation", "kpi", "index", "dictionary"]);
    assert_eq!(affected, BTreeSet::from(["ran_quality".to_string()]));

    assert_eq!(
        harness.augmentation_client.calls(),
        vec![Call::Create("geo".into())]
    );
    assert_eq!(
        harness.kpi_client.calls(),
        vec![
            Call::Create("drop_rate".into()),
            Call::Create("drop_rate_x2".into())
        ]
    );
    assert_eq!(
        harness.index_client.calls(),
        vec![Call::Create("ran_quality".into())]
    );

    let index = &harness.runtime_indexes.snapshot()[0];
    assert!(index.source_tables.contains("kpi_drop_rate_x2_60"));

    assert_eq!(harness.dict_schemas.len(), 1);
    assert_eq!(harness.dict_pm.len(), 2);
    assert_eq!(harness.dict_kpis.len(), 2);
    assert_eq!(harness.dict_profiles.len(), 1);
    assert_eq!(harness.dict_augmentations.len(), 1);

    assert_eq!(
        harness.states.statuses(),
        vec![ProvisioningStatus::Started, ProvisioningStatus::Completed]
    );
}

#[tokio::test]
async fn unchanged_input_only_reasserts() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());
    harness.provisioner.provision().await.unwrap();
    harness.clear_calls();

    let outcome = harness.provisioner.provision().await.unwrap();

    assert!(outcome.is_reassert());
    assert_eq!(harness.downstream_mutations(), 0);
    assert_eq!(
        harness.kpi_client.calls(),
        vec![Call::GetAll, Call::Reassert(2)]
    );
    // lifecycle untouched by a re-assert
    assert_eq!(harness.states.statuses().len(), 2);
}

#[tokio::test]
async fn reassert_repairs_downstream_drift() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());
    harness.provisioner.provision().await.unwrap();

    // the calculator lost its state behind our back
    harness.kpi_client.delete_all().await.unwrap();
    assert!(harness.kpi_client.remote().is_empty());
    harness.clear_calls();

    let ProvisioningOutcome::Reasserted { steps } = harness.provisioner.provision().await.unwrap()
    else {
        panic!("expected a re-assert");
    };
    assert_eq!(steps[1].drift, 2);
    assert_eq!(steps[1].reasserted, 2);
    assert_eq!(harness.kpi_client.remote().len(), 2);
    assert_eq!(harness.downstream_mutations(), 0);
}

#[tokio::test]
async fn each_run_starts_with_fresh_pm_definitions() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap();
    assert_eq!(harness.dict_pm.len(), 2);

    let schemas = document(
        r"
pm_schemas:
  - name: cell
    namespace: ran
    counters: [drops, attempts]
pm_counters:
  - schema: cell
    name: drops
",
    );
    let definitions = document(
        r"
kpi_definitions:
  - name: drop_count
    alias: drop_count
    expression: drops
    aggregation_period: 60
    inputs: [drops]
profile_definitions:
  - name: ran_quality
    kpis: [drop_count]
",
    );
    harness
        .provisioner
        .provision_documents(vec![schemas, definitions])
        .await
        .unwrap();

    let names: Vec<_> = harness
        .dict_pm
        .snapshot()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["drops".to_string()]);
}

#[tokio::test]
async fn changed_kpi_updates_and_marks_profile_affected() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());
    harness.provisioner.provision().await.unwrap();
    harness.clear_calls();

    let tweak = PartialSubmission::new().with_kpis(vec![KpiDefinition::new(
        "drop_rate_x2",
        "drop_rate_x2",
        "drop_rate * 3",
    )
    .with_period(60)
    .with_inputs(["drop_rate"])]);
    let mut documents = full_documents();
    documents.push(tweak);

    let (report, affected) =
        provisioned(harness.provisioner.provision_documents(documents).await.unwrap());

    assert_eq!(affected, BTreeSet::from(["ran_quality".to_string()]));
    assert_eq!(
        harness.kpi_client.mutations(),
        vec![Call::Update("drop_rate_x2".into())]
    );
    assert!(harness.augmentation_client.mutations().is_empty());
    assert!(harness.index_client.mutations().is_empty());
    assert_eq!(report.steps[1].updated, 1);
}

#[tokio::test]
async fn later_document_wins() {
    let harness = Harness::new(ProvisionerConfig::default());
    let override_doc = document(
        r"
kpi_definitions:
  - name: drop_rate
    alias: drop_rate
    expression: drops / (attempts + 1)
    aggregation_period: 60
    inputs: [drops, attempts]
",
    );

    harness
        .provisioner
        .provision_documents(vec![schema_document(), definitions_document(), override_doc])
        .await
        .unwrap();

    let stored = harness
        .dict_kpis
        .snapshot()
        .into_iter()
        .find(|k| k.name == "drop_rate")
        .unwrap();
    assert_eq!(stored.expression, "drops / (attempts + 1)");
}

#[tokio::test]
async fn removed_profile_deletes_its_resources() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());
    harness.provisioner.provision().await.unwrap();
    harness.clear_calls();

    let mut definitions = definitions_document();
    definitions.profile_definitions.clear();
    let (_, affected) = provisioned(
        harness
            .provisioner
            .provision_documents(vec![schema_document(), definitions])
            .await
            .unwrap(),
    );

    assert!(affected.contains("ran_quality"));
    assert_eq!(
        harness.augmentation_client.mutations(),
        vec![Call::Delete("geo".into())]
    );
    assert_eq!(harness.kpi_client.mutations().len(), 2);
    assert_eq!(
        harness.index_client.mutations(),
        vec![Call::Delete("ran_quality".into())]
    );
    assert!(harness.dict_profiles.is_empty());
}

#[tokio::test]
async fn validation_failure_sends_nothing_downstream() {
    let harness = Harness::new(ProvisionerConfig::default());
    let broken = PartialSubmission::new()
        .with_profiles(vec![ProfileDefinition::new("p").with_kpis(["missing"])]);

    let err = harness
        .provisioner
        .provision_documents(vec![schema_document(), broken])
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Validation(_)));
    assert_eq!(harness.downstream_mutations(), 0);
    assert!(harness.states.statuses().is_empty());
}

#[tokio::test]
async fn invalid_pm_definitions_are_dropped_not_fatal() {
    let harness = Harness::new(ProvisionerConfig::default());
    let mut schemas = schema_document();
    schemas
        .pm_definitions
        .push(prov_model::PmDefinition::new("nowhere", "ghost"));

    harness
        .provisioner
        .provision_documents(vec![schemas, definitions_document()])
        .await
        .unwrap();

    let names: Vec<_> = harness
        .dict_pm
        .snapshot()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert!(!names.contains(&"ghost".to_string()));
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn provision_path_loads_single_document() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .loader
        .insert_path("defs/schemas.yaml", schema_document());

    let outcome = harness
        .provisioner
        .provision_path(Path::new("defs/schemas.yaml"))
        .await
        .unwrap();

    // schemas alone change the dictionary but affect no profile
    let (_, affected) = provisioned(outcome);
    assert!(affected.is_empty());
    assert_eq!(harness.dict_schemas.len(), 1);
    assert_eq!(harness.downstream_mutations(), 0);
}

#[tokio::test]
async fn missing_path_is_a_load_error() {
    let harness = Harness::new(ProvisionerConfig::default());

    let err = harness
        .provisioner
        .provision_path(Path::new("nope.yaml"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Load(_)));
}

#[tokio::test]
async fn dry_run_records_locally_without_calls() {
    let config = ProvisionerConfig::default().with_targets(TargetModes {
        augmentation: TargetMode::DryRun,
        kpi: TargetMode::DryRun,
        index: TargetMode::DryRun,
    });
    let harness = Harness::new(config);

    harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap();

    assert!(harness.kpi_client.calls().is_empty());
    assert_eq!(harness.runtime_kpis.len(), 2);
    assert_eq!(harness.runtime_indexes.len(), 1);

    // no remote view in dry-run, so a re-assert reports no drift
    let ProvisioningOutcome::Reasserted { steps } = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap()
    else {
        panic!("expected a re-assert");
    };
    assert!(steps.iter().all(|s| s.drift == 0));
    assert_eq!(steps[1].reasserted, 2);
    assert!(harness.kpi_client.calls().is_empty());
}

#[tokio::test]
async fn disabled_kpi_target_skips_kpis_and_indexes() {
    let harness = Harness::new(ProvisionerConfig::default().with_kpi_enabled(false));

    let (report, _) = provisioned(
        harness
            .provisioner
            .provision_documents(full_documents())
            .await
            .unwrap(),
    );

    assert!(report.steps[1].skipped);
    assert!(harness.kpi_client.calls().is_empty());
    assert!(harness.runtime_kpis.is_empty());
    // no provisioned KPIs means no index sources
    assert!(harness.index_client.mutations().is_empty());
    assert_eq!(harness.augmentation_client.mutations().len(), 1);
}

#[tokio::test]
async fn recover_reports_interrupted_run() {
    let interrupted = prov_model::ProvisioningState::started();
    let harness = Harness::with_states(
        ProvisionerConfig::default(),
        InMemoryStateStore::seeded(interrupted.clone()),
    );

    let state = harness.provisioner.recover().await.unwrap();
    assert_eq!(state.state, ProvisioningStatus::Started);
    assert_eq!(state.id, interrupted.id);
}

#[tokio::test]
async fn recover_fails_when_store_unreadable() {
    let states = InMemoryStateStore::new();
    states.fail_reads(true);
    let harness = Harness::with_states(ProvisionerConfig::default(), states);

    let err = harness.provisioner.recover().await.unwrap_err();
    assert!(matches!(err, ProvisioningError::Persistence(_)));
}
