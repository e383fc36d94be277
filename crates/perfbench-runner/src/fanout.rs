//! Replication of a test case across database/collection slots.

use std::fmt;
use std::sync::Arc;

use perfbench_core::namespace;
use perfbench_core::{
    AdminClient, CaseHook, CollectionHandle, ConfigResult, CrudOptions, Environment,
    FanoutParams, ShardMode, TestCase, TrialError,
};
use serde_json::{json, Value};
use tracing::debug;

/// Default database name prefix; slot databases are `test0`, `test1`, ...
pub const DEFAULT_DATABASE_PREFIX: &str = "test";

/// One (database, collection) target of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub collection: CollectionHandle,
    pub database_index: u32,
    pub collection_index: u32,
}

impl Slot {
    /// Hook context for this slot.
    #[must_use]
    pub fn environment(&self, thread_count: u32, trial: u32) -> Environment {
        Environment {
            thread_count,
            trial,
            database_index: self.database_index,
            collection_index: self.collection_index,
        }
    }
}

/// Builds execution plans with a fixed database naming scheme.
#[derive(Debug, Clone)]
pub struct ExecutionFanout {
    database_prefix: String,
}

impl Default for ExecutionFanout {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_PREFIX)
    }
}

impl ExecutionFanout {
    pub fn new(database_prefix: impl Into<String>) -> Self {
        Self {
            database_prefix: database_prefix.into(),
        }
    }

    /// Slots for `case_name`, database-major.
    #[must_use]
    pub fn slots(&self, case_name: &str, params: &FanoutParams) -> Vec<Slot> {
        let base = normalize_name(case_name);
        let mut slots = Vec::with_capacity(params.slot_count());
        for database_index in 0..params.multidb {
            let database = format!("{}{database_index}", self.database_prefix);
            for collection_index in 0..params.multicoll {
                slots.push(Slot {
                    collection: CollectionHandle::new(
                        database.clone(),
                        format!("{base}{collection_index}"),
                    ),
                    database_index,
                    collection_index,
                });
            }
        }
        slots
    }

    /// Replicates every operation of `case` across all slots.
    ///
    /// Operations are emitted source-major: all copies of the first
    /// operation, then all copies of the second, and so on.
    ///
    /// # Errors
    ///
    /// Fails when an operation cannot be prepared for a slot.
    pub fn build_plan(
        &self,
        case: &TestCase,
        params: FanoutParams,
        crud: &CrudOptions,
    ) -> ConfigResult<ExecutionPlan> {
        let slots = self.slots(&case.name, &params);
        let mut operations = Vec::with_capacity(case.operations.len() * slots.len());

        for template in &case.operations {
            for slot in &slots {
                let mut prepared = namespace::prepare(template, &slot.collection)?;
                if let Value::Object(fields) = &mut prepared {
                    crud.apply(fields);
                }
                operations.push(prepared);
            }
        }

        debug!(
            test = %case.name,
            slots = slots.len(),
            operations = operations.len(),
            "built execution plan"
        );

        Ok(ExecutionPlan {
            test: case.name.clone(),
            slots,
            operations,
            shard: params.shard,
            setup: case.setup.clone(),
            teardown: case.teardown.clone(),
        })
    }
}

/// Replaces every non-alphanumeric character with `_`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Fully resolved work for one trial of one test case.
#[derive(Clone)]
pub struct ExecutionPlan {
    pub test: String,
    pub slots: Vec<Slot>,
    pub operations: Vec<Value>,
    pub shard: ShardMode,
    pub setup: Option<Arc<dyn CaseHook>>,
    pub teardown: Option<Arc<dyn CaseHook>>,
}

impl ExecutionPlan {
    /// Distinct slot databases in first-use order.
    #[must_use]
    pub fn databases(&self) -> Vec<String> {
        let mut databases: Vec<String> = Vec::new();
        for slot in &self.slots {
            let name = slot.collection.database_name();
            if !databases.iter().any(|known| known == name) {
                databases.push(name.to_string());
            }
        }
        databases
    }

    /// Creates every slot collection and applies the sharding mode.
    ///
    /// Creation is idempotent: collections created by a setup hook are kept.
    ///
    /// # Errors
    ///
    /// Propagates the first failing admin primitive.
    pub async fn provision(&self, admin: &dyn AdminClient) -> Result<(), TrialError> {
        if self.shard != ShardMode::None {
            for database in self.databases() {
                match admin.enable_sharding(&database).await {
                    Err(err) if !err.is_already_exists() => return Err(err.into()),
                    _ => {}
                }
            }
        }

        for slot in &self.slots {
            match admin.create_collection(&slot.collection, &json!({})).await {
                Err(err) if !err.is_already_exists() => return Err(err.into()),
                _ => {}
            }

            let Some(key) = self.shard.shard_key() else {
                continue;
            };
            if self.shard == ShardMode::Hashed {
                admin
                    .create_index(&slot.collection, &key, &json!({}))
                    .await?;
            }
            admin
                .shard_collection(&slot.collection.full_namespace(), &key)
                .await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("test", &self.test)
            .field("slots", &self.slots)
            .field("operations", &self.operations)
            .field("shard", &self.shard)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AdminCall, InMemoryAdmin};
    use perfbench_core::{WriteAcknowledgement, WriteConcern};

    fn params(multidb: u32, multicoll: u32) -> FanoutParams {
        FanoutParams {
            multidb,
            multicoll,
            shard: ShardMode::None,
        }
    }

    #[test]
    fn each_copy_targets_its_own_slot() {
        let case = TestCase::new("foo").with_operation(json!({"op": "insert", "doc": {"x": 1}}));
        let plan = ExecutionFanout::default()
            .build_plan(&case, params(1, 3), &CrudOptions::default())
            .unwrap();

        let namespaces: Vec<_> = plan.operations.iter().map(|op| op["ns"].clone()).collect();
        assert_eq!(
            namespaces,
            vec![json!("test0.foo0"), json!("test0.foo1"), json!("test0.foo2")]
        );
        assert_eq!(plan.operations[0]["doc"], json!({"x": 1}));
        assert_eq!(case.operations[0].get("ns"), None);
    }

    #[test]
    fn expansion_is_source_major() {
        let case = TestCase::new("T")
            .with_operation(json!({"op": "insert", "tag": 1}))
            .with_operation(json!({"op": "query", "tag": 2}));
        let plan = ExecutionFanout::default()
            .build_plan(&case, params(2, 1), &CrudOptions::default())
            .unwrap();

        let order: Vec<_> = plan
            .operations
            .iter()
            .map(|op| (op["tag"].clone(), op["ns"].clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                (json!(1), json!("test0.T0")),
                (json!(1), json!("test1.T0")),
                (json!(2), json!("test0.T0")),
                (json!(2), json!("test1.T0")),
            ]
        );
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("Insert.Empty-Capped"), "Insert_Empty_Capped");
        let slots = ExecutionFanout::new("bench").slots("Q.x", &params(2, 2));
        let names: Vec<_> = slots.iter().map(|s| s.collection.full_namespace()).collect();
        assert_eq!(names, ["bench0.Q_x0", "bench0.Q_x1", "bench1.Q_x0", "bench1.Q_x1"]);
        assert_eq!(slots[3].environment(8, 1).collection_index, 1);
    }

    #[test]
    fn crud_options_reach_every_copy() {
        let crud = CrudOptions {
            safe: true,
            write_concern: WriteConcern {
                w: WriteAcknowledgement::Nodes(1),
                j: true,
            },
            write_cmd: false,
            read_cmd: true,
        };
        let case = TestCase::new("c").with_operation(json!({"op": "insert", "safe": false}));
        let plan = ExecutionFanout::default()
            .build_plan(&case, params(2, 2), &crud)
            .unwrap();

        assert_eq!(plan.operations.len(), 4);
        for op in &plan.operations {
            assert_eq!(op["safe"], true);
            assert_eq!(op["writeConcern"], json!({"w": 1, "j": true}));
            assert_eq!(op["writeCmd"], false);
            assert_eq!(op["readCmd"], true);
        }
    }

    #[test]
    fn command_operations_target_the_database() {
        let case = TestCase::new("cmd").with_operation(json!({"op": "command", "command": {"count": "#B_COLL"}}));
        let plan = ExecutionFanout::default()
            .build_plan(&case, params(1, 1), &CrudOptions::default())
            .unwrap();
        assert_eq!(plan.operations[0]["ns"], "test0");
        assert_eq!(plan.operations[0]["command"]["count"], "cmd0");
    }

    #[tokio::test]
    async fn provision_is_idempotent() {
        let admin = InMemoryAdmin::new();
        let case = TestCase::new("p").with_operation(json!({"op": "insert"}));
        let plan = ExecutionFanout::default()
            .build_plan(&case, params(1, 2), &CrudOptions::default())
            .unwrap();

        admin
            .create_collection(&plan.slots[0].collection, &json!({}))
            .await
            .unwrap();
        plan.provision(&admin).await.unwrap();

        assert!(admin.collection_exists("test0.p0"));
        assert!(admin.collection_exists("test0.p1"));
    }

    #[tokio::test]
    async fn hashed_sharding_builds_index_then_shards() {
        let admin = InMemoryAdmin::new();
        let case = TestCase::new("s").with_operation(json!({"op": "insert"}));
        let plan = ExecutionFanout::default()
            .build_plan(
                &case,
                FanoutParams {
                    multidb: 2,
                    multicoll: 1,
                    shard: ShardMode::Hashed,
                },
                &CrudOptions::default(),
            )
            .unwrap();

        plan.provision(&admin).await.unwrap();

        assert!(admin.is_sharding_enabled("test0"));
        assert!(admin.is_sharding_enabled("test1"));
        assert_eq!(admin.indexes("test1.s0"), vec![json!({"_id": "hashed"})]);
        assert_eq!(admin.shard_key("test1.s0"), Some(json!({"_id": "hashed"})));

        let enables = admin
            .calls()
            .into_iter()
            .filter(|call| matches!(call, AdminCall::EnableSharding(_)))
            .count();
        assert_eq!(enables, 2);
    }

    #[tokio::test]
    async fn ranged_sharding_skips_index() {
        let admin = InMemoryAdmin::new();
        let case = TestCase::new("r").with_operation(json!({"op": "insert"}));
        let plan = ExecutionFanout::default()
            .build_plan(
                &case,
                FanoutParams {
                    multidb: 1,
                    multicoll: 1,
                    shard: ShardMode::Ranged,
                },
                &CrudOptions::default(),
            )
            .unwrap();

        plan.provision(&admin).await.unwrap();
        assert!(admin.indexes("test0.r0").is_empty());
        assert_eq!(admin.shard_key("test0.r0"), Some(json!({"_id": 1})));
    }
}
