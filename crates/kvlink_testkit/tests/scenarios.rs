//! Scenario tests for the handle layer's observable contract.

use kvlink_core::{NearMatch, TableConfig};
use kvlink_testkit::prelude::*;
use kvlink_testkit::scenarios;

#[test]
fn missing_keys_are_absent() {
    let db = scenarios::populated_database(5);
    let session = db.open_session().unwrap();
    let mut cursor = session.open_cursor(scenarios::TABLE).unwrap();
    assert_eq!(cursor.search("no-such-key").unwrap(), None);
    assert_eq!(cursor.search(&scenarios::key(5)).unwrap(), None);
}

#[test]
fn insert_then_update_then_remove() {
    with_temp_db(|db| {
        let session = db.open_session().unwrap();
        session.create_table("t", &TableConfig::new()).unwrap();
        let mut cursor = session.open_cursor("t").unwrap();

        cursor.set("k", "v1").unwrap();
        cursor.insert().unwrap();
        assert_eq!(cursor.search("k").unwrap().as_deref(), Some("v1"));

        cursor.set("k", "v2").unwrap();
        cursor.update().unwrap();
        assert_eq!(cursor.search("k").unwrap().as_deref(), Some("v2"));

        assert!(cursor.remove().unwrap());
        assert_eq!(cursor.search("k").unwrap(), None);
    });
}

#[test]
fn full_scans_are_ordered_and_terminate() {
    let n = 50;
    let db = scenarios::populated_database(n);
    let session = db.open_session().unwrap();
    let mut cursor = session.open_cursor(scenarios::TABLE).unwrap();

    cursor.reset().unwrap();
    let mut forward = Vec::new();
    while let Some(record) = cursor.next().unwrap() {
        forward.push(record.key);
    }
    let expected: Vec<String> = (0..n).map(scenarios::key).collect();
    assert_eq!(forward, expected);

    let mut backward = Vec::new();
    while let Some(record) = cursor.prev().unwrap() {
        backward.push(record.key);
    }
    let mut reversed = expected;
    reversed.reverse();
    assert_eq!(backward, reversed);
}

#[test]
fn thousand_key_count() {
    let db = scenarios::populated_database(1000);
    let session = db.open_session().unwrap();
    let mut cursor = session.open_cursor(scenarios::TABLE).unwrap();
    cursor.reset().unwrap();
    let mut count = 0;
    while cursor.next().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 1000);
}

#[test]
fn transaction_law() {
    with_temp_db(|db| {
        let session = db.open_session().unwrap();
        session.create_table("t", &TableConfig::new()).unwrap();
        let put = |key: &str| {
            let mut cursor = session.open_cursor("t").unwrap();
            cursor.set(key, "v").unwrap();
            cursor.insert().unwrap();
        };
        let present = |key: &str| {
            let mut cursor = session.open_cursor("t").unwrap();
            cursor.search(key).unwrap().is_some()
        };

        put("before");
        session.begin_transaction().unwrap();
        put("committed");
        session.commit_transaction().unwrap();

        session.begin_transaction().unwrap();
        put("discarded");
        session.rollback_transaction().unwrap();

        assert!(present("before"));
        assert!(present("committed"));
        assert!(!present("discarded"));
    });
}

#[test]
fn session_close_twice() {
    with_temp_db(|db| {
        let mut session = db.open_session().unwrap();
        session.close().unwrap();
        session.close().unwrap();
    });
}

#[test]
fn connection_close_with_open_sessions() {
    for n in [0usize, 1, 2, 10] {
        let db = TestDatabase::new();
        let sessions: Vec<_> = (0..n).map(|_| db.open_session().unwrap()).collect();
        db.close().unwrap();
        assert!(sessions.iter().all(|s| s.is_closed()));
    }
}

#[test]
fn search_near_between_two_keys() {
    with_temp_db(|db| {
        let session = db.open_session().unwrap();
        session.create_table("t", &TableConfig::new()).unwrap();
        let mut cursor = session.open_cursor("t").unwrap();
        for key in ["key1", "key3"] {
            cursor.set(key, key).unwrap();
            cursor.insert().unwrap();
        }

        let near = cursor.search_near("key2").unwrap().unwrap();
        assert!(!near.is_exact());
        let record = cursor.get().unwrap().unwrap();
        assert!(["key1", "key3"].contains(&record.key.as_str()));

        assert_eq!(cursor.search_near("key1").unwrap().map(|m| m.exact()), Some(0));
        assert_eq!(cursor.search_near("key1").unwrap(), Some(NearMatch::Exact));
    });
}

#[test]
fn every_table_is_independent() {
    let (db, names) = scenarios::multi_table_database(4);
    let session = db.open_session().unwrap();
    for name in &names {
        let mut cursor = session.open_cursor(name).unwrap();
        cursor.set("shared", name).unwrap();
        cursor.insert().unwrap();
    }
    for name in &names {
        let mut cursor = session.open_cursor(name).unwrap();
        assert_eq!(cursor.search("shared").unwrap().as_deref(), Some(name.as_str()));
    }
}
