//! Failure handling: suspects, lifecycle reclassification, rollbacks

use async_trait::async_trait;
use parking_lot::Mutex;
use prov_core::{
    DictionaryDelta, DownstreamErrorKind, ProvisionerConfig, ProvisioningContext,
    ProvisioningError, ProvisioningLifecycle, ProvisioningPipeline, ProvisioningStep, Rollback,
    StepReport,
};
use prov_model::{ProvisioningState, ProvisioningStatus, ResourceSubmission};
use prov_reconcile::ConsistencySignal;
use prov_test_utils::{full_documents, Call, Harness, InMemoryStateStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn failed_local_save_after_create_raises_one_suspect() {
    let harness = Harness::new(ProvisionerConfig::default());
    let mut events = harness.signal.subscribe();
    harness.runtime_kpis.fail_saves(true);

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Persistence(_)));
    assert_eq!(harness.signal.suspect_count(), 1);
    assert_eq!(events.recv().await.unwrap().source, "kpi");

    // the create went out before the save failed, and nothing after it ran
    assert_eq!(
        harness.kpi_client.calls(),
        vec![Call::Create("drop_rate".into())]
    );
    assert!(harness.index_client.calls().is_empty());
    assert_eq!(
        harness.states.statuses(),
        vec![ProvisioningStatus::Started, ProvisioningStatus::Error]
    );
}

#[tokio::test]
async fn failed_run_leaves_dictionary_untouched() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .kpi_client
        .fail("create", 1, DownstreamErrorKind::status(400, "bad expression"));

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Downstream(_)));
    assert_eq!(harness.signal.suspect_count(), 0);
    assert!(harness.dict_kpis.is_empty());

    // resubmission is a real run, not a re-assert
    let outcome = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap();
    assert!(!outcome.is_reassert());
    assert_eq!(harness.dict_kpis.len(), 2);
}

#[tokio::test]
async fn unrecorded_failure_keeps_step_error_and_raises_suspect() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness
        .kpi_client
        .fail("create", 1, DownstreamErrorKind::status(400, "bad expression"));
    harness
        .states
        .fail_appends_of(Some(ProvisioningStatus::Error));

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Downstream(_)));
    assert_eq!(harness.signal.suspect_count(), 1);
    // the run is left open in the store
    assert_eq!(harness.states.statuses(), vec![ProvisioningStatus::Started]);
}

#[tokio::test]
async fn dictionary_commit_failure_is_suspect() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.dict_profiles.fail_saves(true);

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisioningError::Persistence(_)));
    assert_eq!(harness.signal.suspect_count(), 1);
    assert_eq!(harness.downstream_mutations(), 4);
}

#[tokio::test]
async fn interrupted_run_is_a_consistency_failure() {
    let harness = Harness::with_states(
        ProvisionerConfig::default(),
        InMemoryStateStore::seeded(ProvisioningState::started()),
    );

    let err = harness
        .provisioner
        .provision_documents(full_documents())
        .await
        .unwrap_err();

    assert!(err.is_consistency_failure());
    assert_eq!(harness.signal.suspect_count(), 1);
    assert_eq!(harness.downstream_mutations(), 0);
    // no ERROR record for a reclassified failure
    assert_eq!(harness.states.statuses(), vec![ProvisioningStatus::Started]);
}

#[tokio::test]
async fn concurrent_run_is_refused() {
    let harness = Harness::new(ProvisionerConfig::default());
    harness.loader.set_documents(full_documents());
    // keep the first run in flight while the second is requested
    harness.loader.set_delay(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        harness.provisioner.provision(),
        harness.provisioner.reset()
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(ProvisioningError::RunInProgress)));
}

struct Recorder {
    name: &'static str,
    fail: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ProvisioningStep for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self, _ctx: &ProvisioningContext<'_>) -> Result<StepReport, ProvisioningError> {
        self.log.lock().push(format!("apply {}", self.name));
        if self.fail {
            Err(prov_core::PersistenceError::new("test", "boom").into())
        } else {
            Ok(StepReport::new(self.name))
        }
    }

    async fn reassert(&self) -> Result<StepReport, ProvisioningError> {
        Ok(StepReport::new(self.name))
    }

    fn rollback(&self) -> Rollback {
        let log = Arc::clone(&self.log);
        let name = self.name;
        Rollback::Compensate(Box::new(move || log.lock().push(format!("undo {name}"))))
    }
}

#[tokio::test]
async fn completed_steps_are_compensated_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let step = |name: &'static str, fail: bool| -> Arc<dyn ProvisioningStep> {
        Arc::new(Recorder {
            name,
            fail,
            log: Arc::clone(&log),
        })
    };
    let states = InMemoryStateStore::new();
    let pipeline = ProvisioningPipeline::new(
        vec![step("a", false), step("b", false), step("c", true), step("d", false)],
        Arc::new(ProvisioningLifecycle::new(states.clone())),
        Arc::new(ConsistencySignal::new()),
    );

    let submission = ResourceSubmission::new();
    let delta = DictionaryDelta::default();
    let affected = BTreeSet::new();
    let ctx = ProvisioningContext {
        submission: &submission,
        dictionary_delta: &delta,
        affected_profiles: &affected,
    };

    assert!(pipeline.run(&ctx).await.is_err());
    assert_eq!(
        *log.lock(),
        vec!["apply a", "apply b", "apply c", "undo b", "undo a"]
    );
    assert_eq!(
        states.statuses(),
        vec![ProvisioningStatus::Started, ProvisioningStatus::Error]
    );
}
