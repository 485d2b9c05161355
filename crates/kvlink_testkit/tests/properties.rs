//! Property tests: a table behaves like an ordered map.

use kvlink_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn operations_match_model(ops in operation_sequence_strategy(1, 48)) {
        let mut harness = ModelHarness::new("props");
        for op in &ops {
            harness.apply(op);
        }
        harness.verify_all();
    }

    #[test]
    fn rollback_hides_every_change(
        before in operation_sequence_strategy(0, 16),
        during in operation_sequence_strategy(1, 16),
    ) {
        let mut harness = ModelHarness::new("props");
        for op in &before {
            harness.apply(op);
        }
        harness.apply_rolled_back(&during);
        harness.verify_all();
    }

    #[test]
    fn inserted_keys_are_found(key in key_strategy(), value in value_strategy()) {
        let db = TestDatabase::new();
        let session = db.open_session().unwrap();
        session.create_table("props", &Default::default()).unwrap();
        let mut cursor = session.open_cursor("props").unwrap();
        prop_assert_eq!(cursor.search(&key).unwrap(), None);
        cursor.set(&key, &value).unwrap();
        cursor.insert().unwrap();
        prop_assert_eq!(cursor.search(&key).unwrap(), Some(value));
    }

    #[test]
    fn raw_tables_round_trip_bytes(key in raw_bytes_strategy(), value in raw_bytes_strategy()) {
        let db = TestDatabase::new();
        let session = db.open_session().unwrap();
        session.create_table("bytes", &kvlink_core::TableConfig::raw()).unwrap();
        let mut cursor = session.open_cursor("bytes").unwrap();
        cursor.set_raw_key(&key).unwrap();
        cursor.set_raw_value(&value).unwrap();
        cursor.insert().unwrap();
        prop_assert_eq!(cursor.search_near(&key).unwrap(), Some(kvlink_core::NearMatch::Exact));
        prop_assert_eq!(cursor.get_raw_value().unwrap(), Some(value));
    }
}
