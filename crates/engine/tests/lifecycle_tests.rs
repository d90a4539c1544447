//! Registry lifecycle and configuration tests
//!
//! Covers open/load/remove of indexed collections, store naming, and
//! loading defaults from `keyspan.toml`.

use keyspan_engine::{
    Database, Error, FilterIndex, IndexConfig, IndexDefinition, SearchIndex, CONFIG_FILE_NAME,
};
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq)]
struct Order {
    status: String,
    note: String,
}

fn order(status: &str, note: &str) -> Order {
    Order {
        status: status.to_string(),
        note: note.to_string(),
    }
}

fn order_indexes() -> Vec<IndexDefinition<Uuid, Order>> {
    vec![
        FilterIndex::new("status", |_: &Uuid, o: &Order| o.status.clone())
            .unwrap()
            .into(),
        SearchIndex::new("note", |_: &Uuid, o: &Order| Some(o.note.clone()))
            .unwrap()
            .into(),
    ]
}

#[test]
fn test_open_names_index_stores_under_primary() {
    init_tracing();
    let db = Database::new();
    let orders = db.open_indexed("orders", order_indexes()).unwrap();

    assert_eq!(orders.name(), "orders");
    let names: Vec<String> = orders
        .indexes()
        .iter()
        .map(|index| index.store_name("orders"))
        .collect();
    assert_eq!(names, vec!["orders/filter/status", "orders/search/note"]);
    for name in &names {
        assert!(db.registry().contains(name));
    }
}

#[test]
fn test_reopen_sees_committed_data() {
    init_tracing();
    let db = Database::new();
    let id = Uuid::new_v4();
    {
        let orders = db.open_indexed("orders", order_indexes()).unwrap();
        db.transaction(|tx| orders.add(tx, id, order("open", "fragile glass")))
            .unwrap();
    }

    let orders = db
        .load_indexed("orders", order_indexes())
        .unwrap()
        .expect("collection exists");
    let mut tx = db.begin();
    assert_eq!(orders.filter_keys(&mut tx, "status", "open".to_string()).unwrap(), vec![id]);
    assert_eq!(orders.search_keys(&mut tx, "glass", 10).unwrap(), vec![id]);
}

#[test]
fn test_load_missing_collection_is_none() {
    let db = Database::new();
    assert!(db.load_indexed("orders", order_indexes()).unwrap().is_none());
    assert!(db.registry().is_empty());
}

#[test]
fn test_load_with_undeclared_index_store_is_none() {
    let db = Database::new();
    db.open_indexed("orders", order_indexes()).unwrap();

    let mut wider = order_indexes();
    wider.push(
        FilterIndex::new("note_len", |_: &Uuid, o: &Order| o.note.len())
            .unwrap()
            .into(),
    );
    assert!(db.load_indexed("orders", wider).unwrap().is_none());
    assert!(!db.registry().contains("orders/filter/note_len"));
}

#[test]
fn test_remove_deletes_primary_and_index_stores() {
    let db = Database::new();
    let orders = db.open_indexed("orders", order_indexes()).unwrap();
    db.transaction(|tx| orders.add(tx, Uuid::new_v4(), order("open", "a")))
        .unwrap();

    assert!(db.remove_indexed("orders", &order_indexes()).unwrap());
    assert!(db.registry().is_empty());
    assert!(db.load_indexed("orders", order_indexes()).unwrap().is_none());

    let fresh = db.open_indexed("orders", order_indexes()).unwrap();
    let mut tx = db.begin();
    assert_eq!(fresh.count(&mut tx).unwrap(), 0);
}

#[test]
fn test_same_name_with_other_types_is_rejected() {
    let db = Database::new();
    db.open_indexed("orders", order_indexes()).unwrap();

    let other: Vec<IndexDefinition<Uuid, Order>> = vec![FilterIndex::new(
        "status",
        |_: &Uuid, o: &Order| o.status.len(),
    )
    .unwrap()
    .into()];
    assert!(matches!(
        db.open_indexed("orders", other),
        Err(Error::StoreTypeMismatch { .. })
    ));
}

#[test]
fn test_empty_index_name_is_rejected() {
    assert!(matches!(
        FilterIndex::new("", |_: &Uuid, o: &Order| o.status.clone()),
        Err(Error::Construction(_))
    ));
    assert!(matches!(
        SearchIndex::new("  ", |_: &Uuid, o: &Order| Some(o.note.clone())),
        Err(Error::Construction(_))
    ));
}

#[test]
fn test_database_from_config_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "default_timeout_ms = 500\nmax_retries = 7\n").unwrap();

    let db = Database::from_config_file(&path).unwrap();
    assert_eq!(db.config().default_timeout(), Duration::from_millis(500));
    assert_eq!(db.retry_config().max_retries, 7);

    let orders = db.open_indexed("orders", order_indexes()).unwrap();
    assert_eq!(orders.default_options().timeout, Duration::from_millis(500));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "default_timeout_ms = 0\n").unwrap();
    assert!(matches!(
        Database::from_config_file(&path),
        Err(Error::Config(_))
    ));

    std::fs::write(&path, "default_timeout_ms = \"soon\"\n").unwrap();
    assert!(matches!(IndexConfig::from_file(&path), Err(Error::Config(_))));
}
