//! Testing utilities for the provisioning workspace
//!
//! In-memory collaborators with failure injection, and a [`Harness`] that
//! wires them into a [`Provisioner`].

#![allow(missing_docs)]

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use prov_core::{
    Dictionary, DownstreamClient, DownstreamClients, DownstreamError, DownstreamErrorKind,
    InputLoader, LoadError, PersistenceError, ProvisionerConfig, Provisioner, Repository,
    RuntimeStores, StateStore,
};
use prov_model::{
    AugmentationDefinition, Definition, IndexDefinition, KpiDefinition, PartialSubmission,
    PmDefinition, PmSchema, ProfileDefinition, ProvisioningState,
};
use prov_reconcile::ConsistencySignal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Repository backed by an ordered map
pub struct InMemoryRepository<T: Definition> {
    name: &'static str,
    items: Mutex<IndexMap<T::Key, T>>,
    fail_saves: Mutex<bool>,
    fail_delete_all: Mutex<bool>,
}

impl<T: Definition> InMemoryRepository<T> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            items: Mutex::new(IndexMap::new()),
            fail_saves: Mutex::new(false),
            fail_delete_all: Mutex::new(false),
        })
    }

    /// Make every subsequent `save` fail
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    pub fn fail_delete_all(&self, fail: bool) {
        *self.fail_delete_all.lock() = fail;
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl<T: Definition> Repository<T> for InMemoryRepository<T> {
    async fn find_all(&self) -> Result<Vec<T>, PersistenceError> {
        Ok(self.snapshot())
    }

    async fn find_by_id(&self, key: &T::Key) -> Result<Option<T>, PersistenceError> {
        Ok(self.items.lock().get(key).cloned())
    }

    async fn save(&self, item: &T) -> Result<(), PersistenceError> {
        if *self.fail_saves.lock() {
            return Err(PersistenceError::new(self.name, "injected save failure"));
        }
        self.items.lock().insert(item.key(), item.clone());
        Ok(())
    }

    async fn delete(&self, key: &T::Key) -> Result<(), PersistenceError> {
        self.items.lock().shift_remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), PersistenceError> {
        if *self.fail_delete_all.lock() {
            return Err(PersistenceError::new(self.name, "injected delete_all failure"));
        }
        self.items.lock().clear();
        Ok(())
    }
}

/// Client call as recorded by [`RecordingClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Update(String),
    Delete(String),
    DeleteAll,
    GetAll,
    Reassert(usize),
}

impl Call {
    /// Whether the call mutates downstream state
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Update(_) | Self::Delete(_))
    }
}

/// Downstream fake that records calls and keeps remote state
pub struct RecordingClient<T: Definition> {
    name: &'static str,
    calls: Mutex<Vec<Call>>,
    remote: Mutex<IndexMap<T::Key, T>>,
    /// Operation -> number of upcoming calls that fail
    failures: Mutex<HashMap<&'static str, (u32, DownstreamErrorKind)>>,
}

impl<T: Definition> RecordingClient<T> {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Mutex::new(Vec::new()),
            remote: Mutex::new(IndexMap::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Fail the next `times` calls of `operation` with `kind`
    pub fn fail(&self, operation: &'static str, times: u32, kind: DownstreamErrorKind) {
        self.failures.lock().insert(operation, (times, kind));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn remote(&self) -> Vec<T> {
        self.remote.lock().values().cloned().collect()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), DownstreamError> {
        self.calls.lock().push(call);
        let mut failures = self.failures.lock();
        if let Some((remaining, kind)) = failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DownstreamError::new(self.name, operation, kind.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Definition> DownstreamClient<T> for RecordingClient<T> {
    async fn create(&self, item: &T) -> Result<(), DownstreamError> {
        self.record("create", Call::Create(item.key().to_string()))?;
        self.remote.lock().insert(item.key(), item.clone());
        Ok(())
    }

    async fn update(&self, item: &T) -> Result<(), DownstreamError> {
        self.record("update", Call::Update(item.key().to_string()))?;
        self.remote.lock().insert(item.key(), item.clone());
        Ok(())
    }

    async fn delete(&self, item: &T) -> Result<(), DownstreamError> {
        self.record("delete", Call::Delete(item.key().to_string()))?;
        self.remote.lock().shift_remove(&item.key());
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), DownstreamError> {
        self.record("delete_all", Call::DeleteAll)?;
        self.remote.lock().clear();
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<T>, DownstreamError> {
        self.record("get_all", Call::GetAll)?;
        Ok(self.remote())
    }

    async fn reassert(&self, items: &[T]) -> Result<(), DownstreamError> {
        self.record("reassert", Call::Reassert(items.len()))?;
        let mut remote = self.remote.lock();
        for item in items {
            remote.insert(item.key(), item.clone());
        }
        Ok(())
    }
}

/// State store backed by a vector
#[derive(Default)]
pub struct InMemoryStateStore {
    records: Mutex<Vec<ProvisioningState>>,
    fail_reads: Mutex<bool>,
    fail_appends_of: Mutex<Option<prov_model::ProvisioningStatus>>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seeded(state: ProvisioningState) -> Arc<Self> {
        let store = Self::new();
        store.records.lock().push(state);
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    /// Refuse to persist records with this status
    pub fn fail_appends_of(&self, status: Option<prov_model::ProvisioningStatus>) {
        *self.fail_appends_of.lock() = status;
    }

    pub fn statuses(&self) -> Vec<prov_model::ProvisioningStatus> {
        self.records.lock().iter().map(|r| r.state).collect()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn current(&self) -> Result<Option<ProvisioningState>, PersistenceError> {
        if *self.fail_reads.lock() {
            return Err(PersistenceError::new("state", "injected read failure"));
        }
        Ok(self.records.lock().last().cloned())
    }

    async fn append(&self, state: &ProvisioningState) -> Result<(), PersistenceError> {
        if *self.fail_appends_of.lock() == Some(state.state) {
            return Err(PersistenceError::new("state", "injected write failure"));
        }
        self.records.lock().push(state.clone());
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ProvisioningState>, PersistenceError> {
        Ok(self.records.lock().clone())
    }
}

/// Loader serving documents from memory
#[derive(Default)]
pub struct StaticLoader {
    ordered: Mutex<Vec<PartialSubmission>>,
    by_path: Mutex<HashMap<PathBuf, PartialSubmission>>,
    delay: Mutex<Option<Duration>>,
}

impl StaticLoader {
    pub fn new(documents: Vec<PartialSubmission>) -> Arc<Self> {
        Arc::new(Self {
            ordered: Mutex::new(documents),
            by_path: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
        })
    }

    /// Sleep this long before returning documents
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_documents(&self, documents: Vec<PartialSubmission>) {
        *self.ordered.lock() = documents;
    }

    pub fn insert_path(&self, path: impl Into<PathBuf>, document: PartialSubmission) {
        self.by_path.lock().insert(path.into(), document);
    }
}

#[async_trait]
impl InputLoader for StaticLoader {
    async fn load_ordered(&self) -> Result<Vec<PartialSubmission>, LoadError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.ordered.lock().clone())
    }

    async fn load_one(&self, path: &Path) -> Result<PartialSubmission, LoadError> {
        self.by_path
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_path_buf()))
    }
}

/// Provisioner wired to in-memory collaborators, with handles to each fake
pub struct Harness {
    pub provisioner: Provisioner,
    pub loader: Arc<StaticLoader>,
    pub signal: Arc<ConsistencySignal>,
    pub states: Arc<InMemoryStateStore>,
    pub dict_schemas: Arc<InMemoryRepository<PmSchema>>,
    pub dict_pm: Arc<InMemoryRepository<PmDefinition>>,
    pub dict_kpis: Arc<InMemoryRepository<KpiDefinition>>,
    pub dict_profiles: Arc<InMemoryRepository<ProfileDefinition>>,
    pub dict_augmentations: Arc<InMemoryRepository<AugmentationDefinition>>,
    pub runtime_augmentations: Arc<InMemoryRepository<AugmentationDefinition>>,
    pub runtime_kpis: Arc<InMemoryRepository<KpiDefinition>>,
    pub runtime_indexes: Arc<InMemoryRepository<IndexDefinition>>,
    pub augmentation_client: Arc<RecordingClient<AugmentationDefinition>>,
    pub kpi_client: Arc<RecordingClient<KpiDefinition>>,
    pub index_client: Arc<RecordingClient<IndexDefinition>>,
}

impl Harness {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self::with_states(config, InMemoryStateStore::new())
    }

    pub fn with_states(config: ProvisionerConfig, states: Arc<InMemoryStateStore>) -> Self {
        let loader = StaticLoader::new(Vec::new());
        let signal = Arc::new(ConsistencySignal::new());
        let dict_schemas = InMemoryRepository::new("dictionary.pm_schemas");
        let dict_pm = InMemoryRepository::new("dictionary.pm_definitions");
        let dict_kpis = InMemoryRepository::new("dictionary.kpis");
        let dict_profiles = InMemoryRepository::new("dictionary.profiles");
        let dict_augmentations = InMemoryRepository::new("dictionary.augmentations");
        let runtime_augmentations = InMemoryRepository::new("runtime.augmentations");
        let runtime_kpis = InMemoryRepository::new("runtime.kpis");
        let runtime_indexes = InMemoryRepository::new("runtime.indexes");
        let augmentation_client = RecordingClient::new("augmentation");
        let kpi_client = RecordingClient::new("kpi");
        let index_client = RecordingClient::new("index");

        let provisioner = Provisioner::builder(config)
            .loader(loader.clone())
            .dictionary(Dictionary {
                pm_schemas: dict_schemas.clone(),
                pm_definitions: dict_pm.clone(),
                kpi_definitions: dict_kpis.clone(),
                profile_definitions: dict_profiles.clone(),
                augmentations: dict_augmentations.clone(),
            })
            .runtime_stores(RuntimeStores {
                augmentations: runtime_augmentations.clone(),
                kpis: runtime_kpis.clone(),
                indexes: runtime_indexes.clone(),
            })
            .clients(DownstreamClients {
                augmentation: augmentation_client.clone(),
                kpi: kpi_client.clone(),
                index: index_client.clone(),
            })
            .state_store(states.clone())
            .signal(signal.clone())
            .build()
            .unwrap();

        Self {
            provisioner,
            loader,
            signal,
            states,
            dict_schemas,
            dict_pm,
            dict_kpis,
            dict_profiles,
            dict_augmentations,
            runtime_augmentations,
            runtime_kpis,
            runtime_indexes,
            augmentation_client,
            kpi_client,
            index_client,
        }
    }

    /// Mutating calls across all three downstream clients
    pub fn downstream_mutations(&self) -> usize {
        self.augmentation_client.mutations().len()
            + self.kpi_client.mutations().len()
            + self.index_client.mutations().len()
    }

    pub fn clear_calls(&self) {
        self.augmentation_client.clear_calls();
        self.kpi_client.clear_calls();
        self.index_client.clear_calls();
    }
}

/// Parse a YAML input document
pub fn document(yaml: &str) -> PartialSubmission {
    serde_yaml::from_str(yaml).unwrap()
}

/// Schema document with one `cell` schema and two counters
pub fn schema_document() -> PartialSubmission {
    document(
        r"
pm_schemas:
  - name: cell
    namespace: ran
    counters: [drops, attempts]
pm_counters:
  - schema: cell
    name: drops
  - schema: cell
    name: attempts
",
    )
}

/// Definitions document: one augmentation, two KPIs, one profile
pub fn definitions_document() -> PartialSubmission {
    document(
        r"
augmentations:
  - name: geo
    url: http://geo:8080
    output_schema: cell_geo
    rules:
      - input_schema: cell
        fields: [lat, lon]
kpi_definitions:
  - name: drop_rate
    alias: drop_rate
    expression: drops / attempts
    aggregation_period: 60
    inputs: [drops, attempts]
  - name: drop_rate_x2
    alias: drop_rate_x2
    expression: drop_rate * 2
    aggregation_period: 60
    inputs: [drop_rate]
profile_definitions:
  - name: ran_quality
    kpis: [drop_rate_x2]
    augmentations: [geo]
",
    )
}

/// Both fixture documents in load order
pub fn full_documents() -> Vec<PartialSubmission> {
    vec![schema_document(), definitions_document()]
}
