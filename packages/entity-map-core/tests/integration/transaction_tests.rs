//! Session transaction lifecycle against the in-memory engine.

use ntest::timeout;

use entity_map_core::{DbError, Filter, FindOptions, IsolationLevel, Value};

use crate::fixtures;

fn pool_key_filter() -> Filter {
    Filter::new()
        .eq("contract_address", Value::Text("0x22".into()))
        .eq("chain_id", Value::Int(5))
}

#[test]
fn test_begin_twice_rejected() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();
    em.begin(IsolationLevel::ReadCommitted).unwrap();
    assert!(matches!(
        em.begin(IsolationLevel::ReadCommitted),
        Err(DbError::AlreadyActive)
    ));
}

#[test]
fn test_commit_and_rollback_require_active_transaction() {
    let (database, _storage) = fixtures::open_database();
    let mut em = database.fork();
    assert!(matches!(em.commit(), Err(DbError::NotActive)));
    assert!(matches!(em.rollback(), Err(DbError::NotActive)));
}

#[test]
#[timeout(2000)]
fn test_rollback_discards_flushed_writes() {
    let (database, _storage) = fixtures::open_database();

    let mut em = database.fork();
    em.begin(IsolationLevel::ReadCommitted).unwrap();
    em.persist(fixtures::new_game_pool(&em)).unwrap();
    em.flush().unwrap();
    em.rollback().unwrap();
    assert!(!em.in_transaction());
    assert_eq!(em.pending_insert_count(), 0);

    let mut reader = database.fork();
    let row = reader
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap();
    assert!(row.is_none());
}

#[test]
#[timeout(2000)]
fn test_persist_after_rollback_inserts_again() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();
    em.begin(IsolationLevel::ReadCommitted).unwrap();
    let pool = em.persist(fixtures::new_game_pool(&em)).unwrap();
    em.flush().unwrap();
    em.rollback().unwrap();

    // the rolled-back insert left no row and no tracked identity
    assert!(!pool.borrow().is_persisted());
    let gone = em
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap();
    assert!(gone.is_none());

    // re-persisting the same instance routes it back to the insert list
    em.persist_tracked(&pool).unwrap();
    assert_eq!(em.pending_insert_count(), 1);
    assert_eq!(em.pending_update_count(), 0);
    storage.clear_log();
    em.flush().unwrap();
    assert!(storage.log().contains(&"insert:game_pool".to_string()));

    let mut reader = database.fork();
    let row = reader
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap();
    assert!(row.is_some());
}

#[test]
#[timeout(2000)]
fn test_commit_flushes_and_publishes_writes() {
    let (database, storage) = fixtures::open_database();

    let mut em = database.fork();
    em.begin(IsolationLevel::ReadCommitted).unwrap();
    em.persist(fixtures::new_game_pool(&em)).unwrap();
    storage.clear_log();
    em.commit().unwrap();
    assert!(!em.in_transaction());

    // commit flushed the pending insert without opening a second transaction
    let log = storage.log();
    assert!(log.contains(&"insert:game_pool".to_string()));
    assert_eq!(log.iter().filter(|entry| *entry == "begin").count(), 0);
    assert_eq!(log.iter().filter(|entry| *entry == "commit").count(), 1);

    let mut reader = database.fork();
    let row = reader
        .find_one("game_pool", &pool_key_filter(), &FindOptions::new())
        .unwrap();
    assert!(row.is_some());
}

#[test]
fn test_isolation_level_reaches_storage() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();

    em.begin(IsolationLevel::Serializable).unwrap();
    assert_eq!(
        storage.memory().active_isolation(),
        Some(IsolationLevel::Serializable)
    );

    em.rollback().unwrap();
    assert_eq!(storage.memory().active_isolation(), None);
}

#[test]
fn test_autocommit_flush_wraps_writes() {
    let (database, storage) = fixtures::open_database();
    let mut em = database.fork();
    em.persist(fixtures::new_game_pool(&em)).unwrap();
    storage.clear_log();
    em.flush().unwrap();

    let log = storage.log();
    assert_eq!(log.first().map(String::as_str), Some("begin"));
    assert_eq!(log.last().map(String::as_str), Some("commit"));
}
