//! In-process implementations of the admin and load generator boundaries.
//!
//! Used by `perfbench run --dry-run` and as test doubles. Both record every
//! call and accept injected failures.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use perfbench_core::{
    AdminClient, AdminError, BenchRequest, BenchResponse, BuildInfo, CollectionHandle,
    GeneratorError, LoadGenerator,
};
use serde_json::{json, Value};

/// Admin primitive recorded by [`InMemoryAdmin`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCall {
    DropCollection(String),
    CreateCollection(String),
    CreateIndex { namespace: String, keys: Value },
    InsertDocuments { namespace: String, count: usize },
    RunCommand { database: String, command: Value },
    PendingDrops(Vec<String>),
    EnableSharding(String),
    ShardCollection { namespace: String, key: Value },
    Fsync,
    BuildInfo,
}

#[derive(Debug, Default)]
struct AdminState {
    collections: BTreeMap<String, Vec<Value>>,
    indexes: BTreeMap<String, Vec<Value>>,
    sharded_databases: BTreeSet<String>,
    sharded_collections: BTreeMap<String, Value>,
    /// Namespace -> polls left before the drop completes.
    pending: BTreeMap<String, u32>,
    calls: Vec<AdminCall>,
    failures: HashMap<&'static str, VecDeque<String>>,
}

/// Admin client backed by in-memory maps.
#[derive(Debug)]
pub struct InMemoryAdmin {
    state: Mutex<AdminState>,
    drop_latency: u32,
    build_info: BuildInfo,
}

impl Default for InMemoryAdmin {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAdmin {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AdminState::default()),
            drop_latency: 0,
            build_info: BuildInfo {
                version: "0.0.0-memory".to_string(),
                git_version: "none".to_string(),
                sys_info: "in-memory".to_string(),
            },
        }
    }

    /// Dropped collections stay pending for `polls` calls to `pending_drops`.
    #[must_use]
    pub fn with_drop_latency(mut self, polls: u32) -> Self {
        self.drop_latency = polls;
        self
    }

    #[must_use]
    pub fn with_build_info(mut self, build_info: BuildInfo) -> Self {
        self.build_info = build_info;
        self
    }

    /// Makes the next call of `primitive` fail with `message`.
    ///
    /// Queued failures are consumed one per call.
    pub fn fail_next(&self, primitive: &'static str, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .entry(primitive)
            .or_default()
            .push_back(message.into());
    }

    /// Every primitive invoked so far, in order.
    pub fn calls(&self) -> Vec<AdminCall> {
        self.state.lock().calls.clone()
    }

    pub fn collection_exists(&self, namespace: &str) -> bool {
        self.state.lock().collections.contains_key(namespace)
    }

    /// Namespaces of all live collections.
    pub fn collections(&self) -> Vec<String> {
        self.state.lock().collections.keys().cloned().collect()
    }

    pub fn document_count(&self, namespace: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(namespace)
            .map_or(0, Vec::len)
    }

    pub fn indexes(&self, namespace: &str) -> Vec<Value> {
        self.state
            .lock()
            .indexes
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn shard_key(&self, namespace: &str) -> Option<Value> {
        self.state.lock().sharded_collections.get(namespace).cloned()
    }

    pub fn is_sharding_enabled(&self, database: &str) -> bool {
        self.state.lock().sharded_databases.contains(database)
    }

    /// Records `call` and pops an injected failure for `primitive`, if any.
    fn enter(&self, primitive: &'static str, call: AdminCall) -> Result<(), AdminError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state
            .failures
            .get_mut(primitive)
            .and_then(VecDeque::pop_front)
        {
            Some(message) => Err(AdminError::failed(primitive, message)),
            None => Ok(()),
        }
    }
}

fn database_of(namespace: &str) -> &str {
    namespace.split_once('.').map_or(namespace, |(db, _)| db)
}

#[async_trait]
impl AdminClient for InMemoryAdmin {
    async fn drop_collection(&self, collection: &CollectionHandle) -> Result<(), AdminError> {
        let namespace = collection.full_namespace();
        self.enter("drop_collection", AdminCall::DropCollection(namespace.clone()))?;

        let mut state = self.state.lock();
        let existed = state.collections.remove(&namespace).is_some();
        state.indexes.remove(&namespace);
        state.sharded_collections.remove(&namespace);
        if existed && self.drop_latency > 0 {
            state.pending.insert(namespace, self.drop_latency);
        }
        Ok(())
    }

    async fn create_collection(
        &self,
        collection: &CollectionHandle,
        _options: &Value,
    ) -> Result<(), AdminError> {
        let namespace = collection.full_namespace();
        self.enter(
            "create_collection",
            AdminCall::CreateCollection(namespace.clone()),
        )?;

        let mut state = self.state.lock();
        if state.collections.contains_key(&namespace) {
            return Err(AdminError::AlreadyExists { namespace });
        }
        state.collections.insert(namespace, Vec::new());
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &CollectionHandle,
        keys: &Value,
        _options: &Value,
    ) -> Result<(), AdminError> {
        let namespace = collection.full_namespace();
        self.enter(
            "create_index",
            AdminCall::CreateIndex {
                namespace: namespace.clone(),
                keys: keys.clone(),
            },
        )?;

        let mut state = self.state.lock();
        state.collections.entry(namespace.clone()).or_default();
        state.indexes.entry(namespace).or_default().push(keys.clone());
        Ok(())
    }

    async fn insert_documents(
        &self,
        collection: &CollectionHandle,
        documents: Vec<Value>,
    ) -> Result<(), AdminError> {
        let namespace = collection.full_namespace();
        self.enter(
            "insert_documents",
            AdminCall::InsertDocuments {
                namespace: namespace.clone(),
                count: documents.len(),
            },
        )?;

        self.state
            .lock()
            .collections
            .entry(namespace)
            .or_default()
            .extend(documents);
        Ok(())
    }

    async fn run_command(&self, database: &str, command: &Value) -> Result<Value, AdminError> {
        self.enter(
            "run_command",
            AdminCall::RunCommand {
                database: database.to_string(),
                command: command.clone(),
            },
        )?;
        Ok(json!({ "ok": 1 }))
    }

    async fn pending_drops(&self, databases: &[String]) -> Result<Vec<String>, AdminError> {
        self.enter("pending_drops", AdminCall::PendingDrops(databases.to_vec()))?;

        let mut state = self.state.lock();
        let mut pending = Vec::new();
        state.pending.retain(|namespace, polls_left| {
            if !databases.iter().any(|db| db == database_of(namespace)) {
                return true;
            }
            pending.push(namespace.clone());
            *polls_left = polls_left.saturating_sub(1);
            *polls_left > 0
        });
        Ok(pending)
    }

    async fn enable_sharding(&self, database: &str) -> Result<(), AdminError> {
        self.enter("enable_sharding", AdminCall::EnableSharding(database.to_string()))?;
        self.state
            .lock()
            .sharded_databases
            .insert(database.to_string());
        Ok(())
    }

    async fn shard_collection(&self, namespace: &str, key: &Value) -> Result<(), AdminError> {
        self.enter(
            "shard_collection",
            AdminCall::ShardCollection {
                namespace: namespace.to_string(),
                key: key.clone(),
            },
        )?;

        let mut state = self.state.lock();
        if !state.sharded_databases.contains(database_of(namespace)) {
            return Err(AdminError::failed(
                "shard_collection",
                format!("sharding not enabled for database of `{namespace}`"),
            ));
        }
        state
            .sharded_collections
            .insert(namespace.to_string(), key.clone());
        Ok(())
    }

    async fn fsync(&self) -> Result<(), AdminError> {
        self.enter("fsync", AdminCall::Fsync)
    }

    async fn build_info(&self) -> Result<BuildInfo, AdminError> {
        self.enter("build_info", AdminCall::BuildInfo)?;
        Ok(self.build_info.clone())
    }
}

/// Load generator that answers instantly.
///
/// Scripted answers are returned first, in order. Once the script is
/// exhausted every request is answered with `ops_per_thread * parallel`.
#[derive(Debug)]
pub struct SimulatedGenerator {
    ops_per_thread: f64,
    script: Mutex<VecDeque<Result<BenchResponse, GeneratorError>>>,
    requests: Mutex<Vec<BenchRequest>>,
}

impl Default for SimulatedGenerator {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

impl SimulatedGenerator {
    pub fn new(ops_per_thread: f64) -> Self {
        Self {
            ops_per_thread,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues an answer for a future request.
    pub fn push_response(&self, response: BenchResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a failure for a future request.
    pub fn push_failure(&self, error: GeneratorError) {
        self.script.lock().push_back(Err(error));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<BenchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LoadGenerator for SimulatedGenerator {
    async fn run(&self, request: &BenchRequest) -> Result<BenchResponse, GeneratorError> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(scripted) => scripted,
            None => Ok(BenchResponse::total(
                self.ops_per_thread * f64::from(request.parallel),
                0,
            )),
        }
    }
}
