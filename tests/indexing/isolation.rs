//! Visibility of index maintenance across transactions

use crate::common::*;
use keyspan::{Database, Error, LockMode};

#[test]
fn uncommitted_reindex_is_private() {
    let db = Database::new();
    let books = seeded_catalog(&db);

    let mut writer = db.begin();
    books
        .set(&mut writer, 3, book("poetry", 2012, "Glass Mountain"))
        .unwrap();
    assert_eq!(books.filter_keys(&mut writer, "genre", "poetry".to_string()).unwrap(), vec![3]);

    let mut reader = db.begin();
    assert!(books.filter_keys(&mut reader, "genre", "poetry".to_string()).unwrap().is_empty());
    assert_eq!(books.filter_keys(&mut reader, "genre", "fiction".to_string()).unwrap(), vec![1, 3]);

    db.commit(&mut writer).unwrap();
    assert_eq!(books.filter_keys(&mut reader, "genre", "fiction".to_string()).unwrap(), vec![1]);
}

#[test]
fn update_lock_read_conflicts_with_concurrent_writer() {
    let db = Database::new();
    let books = seeded_catalog(&db);

    let mut first = db.begin();
    let mut second = db.begin();
    let current = books.try_get_with_lock(&mut first, &1, LockMode::Update).unwrap().unwrap();
    books
        .set(&mut second, 1, book("classics", current.year, &current.title))
        .unwrap();
    db.commit(&mut second).unwrap();

    books
        .set(&mut first, 1, book("drama", current.year, &current.title))
        .unwrap();
    assert!(matches!(db.commit(&mut first), Err(Error::TransactionAborted { .. })));

    let mut tx = db.begin();
    assert_eq!(books.try_get(&mut tx, &1).unwrap().unwrap().genre, "classics");
    assert_eq!(books.filter_keys(&mut tx, "genre", "classics".to_string()).unwrap(), vec![1]);
}
