//! Queries across filter and search indexes of one collection

use crate::common::*;
use keyspan::{Database, EnumerationMode, RangeBound, Result};
use std::collections::BTreeSet;

#[test]
fn genre_and_year_filters_agree_with_primary() {
    let db = Database::new();
    let books = seeded_catalog(&db);
    let mut tx = db.begin();

    assert_eq!(books.filter_keys(&mut tx, "genre", "fiction".to_string()).unwrap(), vec![1, 3]);

    let recent: Vec<(u64, Book)> = books
        .range_from_filter(&mut tx, "year", 2005, RangeBound::Inclusive)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    let recent_keys: Vec<u64> = recent.iter().map(|(k, _)| *k).collect();
    assert_eq!(recent_keys, vec![2, 3, 4]);
    assert!(recent.iter().all(|(_, b)| b.year >= 2005));
}

#[test]
fn title_search_unions_words() {
    let db = Database::new();
    let books = seeded_catalog(&db);
    let mut tx = db.begin();

    let hits: BTreeSet<u64> = books
        .search_keys(&mut tx, "silent river", usize::MAX)
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(hits, BTreeSet::from([1, 2, 4]));
}

#[test]
fn removing_last_member_drops_filter_value() {
    let db = Database::new();
    let books = seeded_catalog(&db);

    db.transaction(|tx| books.try_remove(tx, &2)).unwrap();

    let mut tx = db.begin();
    let genres: Vec<String> = books
        .enumerate_index_values(&mut tx, "genre", EnumerationMode::Ordered)
        .unwrap();
    assert_eq!(genres, vec!["fiction", "science"]);
    assert!(books.search_keys(&mut tx, "empires", 10).unwrap().is_empty());
}
