//! End-to-end coverage of the shared-key one-to-one scenario: a scanner
//! whose composite primary key is the game pool it owns a reference to.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ntest::timeout;

use entity_map_core::{
    Database, DbConfig, DbError, EntityDefinition, FieldDef, Filter, FindOptions, IsolationLevel,
    MemoryStorage, Reference, RelationshipDefinition, RelationshipKind, SchemaRegistry,
    StorageEngine, Value, ValueKind,
};

use crate::fixtures;

fn pool_key_filter() -> Filter {
    Filter::new()
        .eq("contract_address", Value::Text("0x22".into()))
        .eq("chain_id", Value::Int(5))
}

/// Persists the pool and its scanner in one session and flushes.
fn seed(database: &Database) {
    let mut em = database.fork();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();

    let mut scanner = fixtures::new_scanner(&em);
    scanner
        .set_reference("game_pool", Reference::resolved(pool))
        .unwrap();
    em.persist(scanner).unwrap();
    em.flush().unwrap();
}

#[test]
#[timeout(2000)]
fn test_shared_key_one_to_one_round_trip() {
    let (database, _storage) = fixtures::open_database();
    seed(&database);

    // fresh session, explicit transaction, eager scanner
    let mut em = database.fork();
    em.begin(IsolationLevel::ReadCommitted).unwrap();

    let pool = em
        .find_one(
            "game_pool",
            &pool_key_filter(),
            &FindOptions::new().populate("scanner"),
        )
        .unwrap()
        .unwrap();
    {
        let pool = pool.borrow();
        assert_eq!(pool.get("rpc_url"), Some(&Value::Text("https://aaa.com".into())));
        assert_eq!(
            pool.get("referral_percents"),
            Some(&Value::IntList(vec![10_000]))
        );
    }

    let scanner_ref = pool.borrow().reference("scanner").cloned().unwrap();
    assert!(scanner_ref.is_resolved());
    let scanner = scanner_ref.get().unwrap();
    {
        let scanner = scanner.borrow();
        assert_eq!(scanner.get("start_block"), Some(&Value::Int(1)));
        assert_eq!(scanner.get("min_confirmations"), Some(&Value::Int(15)));
        assert_eq!(scanner.get("contract_address"), Some(&Value::Text("0x22".into())));
        assert_eq!(scanner.get("chain_id"), Some(&Value::Int(5)));
    }

    // reaching the scanner through its owning relationship lands on the
    // same tracked instance
    let by_relation = em
        .find_one(
            "scanner",
            &Filter::new().related("game_pool", pool_key_filter()),
            &FindOptions::new(),
        )
        .unwrap()
        .unwrap();
    assert!(Rc::ptr_eq(&by_relation, &scanner));

    em.commit().unwrap();
}

#[test]
fn test_insert_order_owner_after_target() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();

    let pool = Rc::new(RefCell::new(fixtures::new_game_pool(&em)));
    let mut scanner = fixtures::new_scanner(&em);
    scanner
        .set_reference("game_pool", Reference::resolved(pool.clone()))
        .unwrap();

    // child enqueued first; the flush must still write the pool first
    em.persist(scanner).unwrap();
    em.persist_tracked(&pool).unwrap();
    storage.clear_log();
    em.flush().unwrap();

    let inserts: Vec<String> = storage
        .log()
        .into_iter()
        .filter(|entry| entry.starts_with("insert:"))
        .collect();
    assert_eq!(inserts, vec!["insert:game_pool", "insert:scanner"]);
}

#[test]
fn test_read_your_writes_before_flush() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();

    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    storage.clear_log();

    let hit = em
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap()
        .unwrap();
    assert!(Rc::ptr_eq(&hit, &pool));
    assert!(storage.log().is_empty(), "full-key lookup must not touch storage");
}

#[test]
fn test_full_key_filter_checks_non_key_conditions() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    storage.clear_log();

    // the tracked instance satisfies the key but not the extra condition
    let miss = em
        .find_one(
            "game_pool",
            &pool_key_filter().eq("rpc_url", Value::Text("https://nope.com".into())),
            &FindOptions::new(),
        )
        .unwrap();
    assert!(miss.is_none());

    let hit = em
        .find_one(
            "game_pool",
            &pool_key_filter().eq("rpc_url", Value::Text("https://aaa.com".into())),
            &FindOptions::new(),
        )
        .unwrap()
        .unwrap();
    assert!(Rc::ptr_eq(&hit, &pool));
}

#[test]
fn test_persist_same_key_merges_into_tracked() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();

    let first = em.persist(fixtures::new_game_pool(&em)).unwrap();

    let mut duplicate = fixtures::new_game_pool(&em);
    duplicate
        .set("rpc_url", Value::Text("https://bbb.com".into()))
        .unwrap();
    let second = em.persist(duplicate).unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(em.pending_insert_count(), 1);
    assert_eq!(
        first.borrow().get("rpc_url"),
        Some(&Value::Text("https://bbb.com".into()))
    );
}

#[test]
#[timeout(2000)]
fn test_lazy_reference_resolves_on_load() {
    let (database, _storage) = fixtures::open_database();
    seed(&database);

    let mut em = database.fork();
    let scanner = em
        .find_one("scanner", &pool_key_filter(), &FindOptions::new())
        .unwrap()
        .unwrap();

    let reference = scanner.borrow().reference("game_pool").cloned().unwrap();
    assert!(!reference.is_resolved());
    assert!(matches!(
        reference.get(),
        Err(DbError::DetachedReference { .. })
    ));

    let pool = em.load(&reference).unwrap();
    assert!(reference.is_resolved());
    assert_eq!(
        pool.borrow().get("rpc_url"),
        Some(&Value::Text("https://aaa.com".into()))
    );
    // resolution is cached on the reference itself
    assert!(Rc::ptr_eq(&reference.get().unwrap(), &pool));
}

#[test]
fn test_key_fields_immutable_after_flush() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    em.flush().unwrap();

    let err = pool.borrow_mut().set("chain_id", Value::Int(9)).unwrap_err();
    assert!(matches!(err, DbError::ImmutableKey { .. }));
    // non-key fields stay writable
    pool.borrow_mut()
        .set("rpc_url", Value::Text("https://bbb.com".into()))
        .unwrap();
}

#[test]
fn test_flush_folds_assigned_timestamps_back() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    assert_eq!(pool.borrow().get("created_at"), None);

    em.flush().unwrap();

    let pool = pool.borrow();
    assert!(matches!(pool.get("created_at"), Some(Value::Instant(_))));
    assert!(matches!(pool.get("updated_at"), Some(Value::Instant(_))));
    assert!(pool.is_persisted());
}

#[test]
fn test_update_after_flush_issues_update() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    em.flush().unwrap();

    pool.borrow_mut()
        .set("rpc_url", Value::Text("https://bbb.com".into()))
        .unwrap();
    em.persist_tracked(&pool).unwrap();
    assert_eq!(em.pending_insert_count(), 0);
    assert_eq!(em.pending_update_count(), 1);

    storage.clear_log();
    em.flush().unwrap();
    assert!(storage.log().contains(&"update:game_pool".to_string()));

    let mut reader = database.fork();
    let reread = reader
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(
        reread.borrow().get("rpc_url"),
        Some(&Value::Text("https://bbb.com".into()))
    );
}

#[test]
fn test_find_one_missing_row_returns_none() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();
    let missing = em
        .find_one(
            "game_pool",
            &Filter::new()
                .eq("contract_address", Value::Text("0xdead".into()))
                .eq("chain_id", Value::Int(1)),
            &FindOptions::new(),
        )
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_populate_dangling_foreign_key_fails() {
    let (database, storage) = fixtures::open_database();

    // scanner row written out of band, without its pool
    storage
        .execute_insert(
            "scanner",
            &[
                "contract_address".to_string(),
                "chain_id".to_string(),
                "start_block".to_string(),
                "min_confirmations".to_string(),
            ],
            &[
                Value::Text("0xdead".into()),
                Value::Int(1),
                Value::Int(1),
                Value::Int(15),
            ],
        )
        .unwrap();

    let mut em = database.fork();
    let err = em
        .find_one(
            "scanner",
            &Filter::new()
                .eq("contract_address", Value::Text("0xdead".into()))
                .eq("chain_id", Value::Int(1)),
            &FindOptions::new().populate("game_pool"),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

fn node_definition(name: &str, partner: &str) -> EntityDefinition {
    EntityDefinition::new(
        name,
        vec![FieldDef::new("id", ValueKind::Int)],
        vec![FieldDef::new("partner_id", ValueKind::Int).nullable()],
        vec![RelationshipDefinition::owning(
            "partner",
            RelationshipKind::OneToOne,
            partner,
            vec![("partner_id".to_string(), "id".to_string())],
        )],
    )
    .unwrap()
}

#[test]
fn test_cyclic_owners_abort_flush_before_writes() {
    let registry = SchemaRegistry::new();
    registry.register(node_definition("left", "right")).unwrap();
    registry.register(node_definition("right", "left")).unwrap();

    let storage = Arc::new(MemoryStorage::default());
    let database = Database::open(
        registry,
        storage.clone() as Arc<dyn StorageEngine>,
        DbConfig::default(),
    )
    .unwrap();

    let mut em = database.fork();
    let mut left = em.create("left").unwrap();
    left.set("id", Value::Int(1)).unwrap();
    let mut right = em.create("right").unwrap();
    right.set("id", Value::Int(2)).unwrap();

    let left = Rc::new(RefCell::new(left));
    let right = Rc::new(RefCell::new(right));
    left.borrow_mut()
        .set_reference("partner", Reference::resolved(right.clone()))
        .unwrap();
    right
        .borrow_mut()
        .set_reference("partner", Reference::resolved(left.clone()))
        .unwrap();

    em.persist_tracked(&left).unwrap();
    em.persist_tracked(&right).unwrap();

    let err = em.flush().unwrap_err();
    assert!(matches!(err, DbError::CyclicDependency { .. }));
    // nothing was written and the batch is still inspectable
    assert_eq!(em.pending_insert_count(), 2);
    assert_eq!(storage.row_count("left"), Some(0));
    assert_eq!(storage.row_count("right"), Some(0));
}
