//! Integration tests for the persistence core.
//!
//! Shared fixtures: the game_pool/scanner schema (a parent and a child
//! sharing the parent's composite key through an owning one-to-one), plus
//! a recording storage wrapper for write-order assertions.

mod end_to_end_tests;
mod transaction_tests;

pub mod fixtures {
    use std::sync::{Arc, Mutex};

    use entity_map_core::{
        ColumnPredicate, Database, DbConfig, DbError, EntityDefinition, EntityInstance, FieldDef,
        IsolationLevel, MemoryStorage, RelationshipDefinition, RelationshipKind, Row,
        SchemaRegistry, Session, StorageEngine, Value, ValueKind,
    };

    fn timestamps() -> Vec<FieldDef> {
        vec![
            FieldDef::new("created_at", ValueKind::Instant).default_now(),
            FieldDef::new("updated_at", ValueKind::Instant)
                .default_now()
                .touch_on_update(),
        ]
    }

    pub fn game_pool_definition() -> EntityDefinition {
        let mut fields = vec![
            FieldDef::new("rpc_url", ValueKind::Text),
            FieldDef::new("referral_percents", ValueKind::IntList),
            FieldDef::new("referral_campaign_id", ValueKind::Int),
        ];
        fields.extend(timestamps());
        EntityDefinition::new(
            "game_pool",
            vec![
                FieldDef::new("contract_address", ValueKind::Text),
                FieldDef::new("chain_id", ValueKind::Int),
            ],
            fields,
            vec![RelationshipDefinition::inverse(
                "scanner",
                RelationshipKind::OneToOne,
                "scanner",
            )],
        )
        .unwrap()
    }

    pub fn scanner_definition() -> EntityDefinition {
        let mut fields = vec![
            FieldDef::new("start_block", ValueKind::Int),
            FieldDef::new("current_block", ValueKind::Int).nullable(),
            FieldDef::new("min_confirmations", ValueKind::Int),
        ];
        fields.extend(timestamps());
        EntityDefinition::new(
            "scanner",
            vec![
                FieldDef::new("contract_address", ValueKind::Text),
                FieldDef::new("chain_id", ValueKind::Int),
            ],
            fields,
            vec![RelationshipDefinition::owning(
                "game_pool",
                RelationshipKind::OneToOne,
                "game_pool",
                vec![
                    (
                        "contract_address".to_string(),
                        "contract_address".to_string(),
                    ),
                    ("chain_id".to_string(), "chain_id".to_string()),
                ],
            )],
        )
        .unwrap()
    }

    pub fn schema_registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry.register(game_pool_definition()).unwrap();
        registry.register(scanner_definition()).unwrap();
        registry
    }

    /// Storage wrapper recording the order of issued operations.
    pub struct RecordingStorage {
        inner: MemoryStorage,
        log: Mutex<Vec<String>>,
    }

    impl RecordingStorage {
        pub fn new() -> Self {
            Self {
                inner: MemoryStorage::default(),
                log: Mutex::new(Vec::new()),
            }
        }

        pub fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn clear_log(&self) {
            self.log.lock().unwrap().clear();
        }

        pub fn memory(&self) -> &MemoryStorage {
            &self.inner
        }

        fn record(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl StorageEngine for RecordingStorage {
        fn execute_insert(
            &self,
            table: &str,
            columns: &[String],
            values: &[Value],
        ) -> Result<Row, DbError> {
            self.record(format!("insert:{}", table));
            self.inner.execute_insert(table, columns, values)
        }

        fn execute_update(
            &self,
            table: &str,
            key_columns: &[String],
            key_values: &[Value],
            changed_columns: &[String],
            changed_values: &[Value],
        ) -> Result<usize, DbError> {
            self.record(format!("update:{}", table));
            self.inner.execute_update(
                table,
                key_columns,
                key_values,
                changed_columns,
                changed_values,
            )
        }

        fn execute_select(
            &self,
            table: &str,
            predicate: &ColumnPredicate,
            columns: &[String],
        ) -> Result<Vec<Row>, DbError> {
            self.record(format!("select:{}", table));
            self.inner.execute_select(table, predicate, columns)
        }

        fn begin_transaction(&self, isolation: IsolationLevel) -> Result<(), DbError> {
            self.record("begin".to_string());
            self.inner.begin_transaction(isolation)
        }

        fn commit(&self) -> Result<(), DbError> {
            self.record("commit".to_string());
            self.inner.commit()
        }

        fn rollback(&self) -> Result<(), DbError> {
            self.record("rollback".to_string());
            self.inner.rollback()
        }

        fn ensure_schema(
            &self,
            definitions: &[std::sync::Arc<EntityDefinition>],
        ) -> Result<(), DbError> {
            self.record("ensure_schema".to_string());
            self.inner.ensure_schema(definitions)
        }
    }

    pub fn open_database() -> (Database, Arc<RecordingStorage>) {
        let storage = Arc::new(RecordingStorage::new());
        let database = Database::open(
            schema_registry(),
            storage.clone() as Arc<dyn StorageEngine>,
            DbConfig::default(),
        )
        .unwrap();
        (database, storage)
    }

    /// Builds the parent instance of the shared-key scenario.
    pub fn new_game_pool(session: &Session) -> EntityInstance {
        let mut pool = session.create("game_pool").unwrap();
        pool.set("contract_address", Value::Text("0x22".into()))
            .unwrap();
        pool.set("chain_id", Value::Int(5)).unwrap();
        pool.set("rpc_url", Value::Text("https://aaa.com".into()))
            .unwrap();
        pool.set("referral_percents", Value::IntList(vec![10_000]))
            .unwrap();
        pool.set("referral_campaign_id", Value::Int(10)).unwrap();
        pool
    }

    /// Builds the child instance; the caller attaches the parent reference.
    pub fn new_scanner(session: &Session) -> EntityInstance {
        let mut scanner = session.create("scanner").unwrap();
        scanner.set("start_block", Value::Int(1)).unwrap();
        scanner.set("min_confirmations", Value::Int(15)).unwrap();
        scanner
    }
}
