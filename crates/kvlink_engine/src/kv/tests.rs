use super::*;
use crate::api::RawCursor;
use tempfile::tempdir;

fn open(dir: &Path) -> Box<dyn RawConnection> {
    KvEngine::new().open(dir, "create").unwrap()
}

fn put(session: &dyn RawSession, uri: &str, key: &str, value: &str) {
    let mut cursor = session.open_cursor(uri, "").unwrap();
    cursor.set_key(key.as_bytes()).unwrap();
    cursor.set_value(value.as_bytes()).unwrap();
    cursor.insert().unwrap();
    cursor.close().unwrap();
}

fn get(session: &dyn RawSession, uri: &str, key: &str) -> Option<String> {
    let mut cursor = session.open_cursor(uri, "").unwrap();
    cursor.set_key(key.as_bytes()).unwrap();
    match cursor.search() {
        Ok(()) => Some(String::from_utf8(cursor.get_value().unwrap()).unwrap()),
        Err(err) if err.is_not_found() => None,
        Err(err) => panic!("search failed: {err}"),
    }
}

fn keys(cursor: &mut dyn RawCursor) -> Vec<String> {
    let mut out = Vec::new();
    while cursor.next().is_ok() {
        out.push(String::from_utf8(cursor.get_key().unwrap()).unwrap());
    }
    out
}

#[test]
fn rejects_unknown_connection_keys() {
    let dir = tempdir().unwrap();
    let err = KvEngine::new()
        .open(dir.path(), "create,bogus_option=1")
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
}

#[test]
fn insert_search_and_scan() {
    let dir = tempdir().unwrap();
    let mut conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "key_format=S,value_format=S").unwrap();
    session.create("table:t", "key_format=S,value_format=S").unwrap();

    for key in ["b", "a", "c"] {
        put(session.as_ref(), "table:t", key, &key.to_uppercase());
    }
    assert_eq!(get(session.as_ref(), "table:t", "b").as_deref(), Some("B"));
    assert_eq!(get(session.as_ref(), "table:t", "z"), None);

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    assert_eq!(keys(cursor.as_mut()), vec!["a", "b", "c"]);
    assert!(matches!(cursor.get_key(), Err(EngineError::NotPositioned)));

    cursor.prev().unwrap();
    assert_eq!(cursor.get_key().unwrap(), b"c");
    cursor.close().unwrap();
    conn.close("").unwrap();
}

#[test]
fn duplicate_insert_and_missing_update() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    put(session.as_ref(), "table:t", "k", "v");

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"k").unwrap();
    cursor.set_value(b"again").unwrap();
    assert!(matches!(cursor.insert(), Err(EngineError::DuplicateKey)));

    cursor.set_key(b"missing").unwrap();
    cursor.set_value(b"x").unwrap();
    assert!(matches!(cursor.update(), Err(EngineError::NotFound)));

    let mut overwrite = session.open_cursor("table:t", "overwrite=true").unwrap();
    overwrite.set_key(b"k").unwrap();
    overwrite.set_value(b"replaced").unwrap();
    overwrite.insert().unwrap();
    assert_eq!(get(session.as_ref(), "table:t", "k").as_deref(), Some("replaced"));
}

#[test]
fn remove_by_key_and_by_position() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    for key in ["a", "b", "c"] {
        put(session.as_ref(), "table:t", key, key);
    }

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"a").unwrap();
    cursor.remove().unwrap();
    cursor.set_key(b"a").unwrap();
    assert!(matches!(cursor.remove(), Err(EngineError::NotFound)));

    cursor.reset().unwrap();
    cursor.next().unwrap();
    assert_eq!(cursor.get_key().unwrap(), b"b");
    cursor.remove().unwrap();
    assert!(cursor.get_value().is_err());
    cursor.next().unwrap();
    assert_eq!(cursor.get_key().unwrap(), b"c");

    cursor.reset().unwrap();
    assert_eq!(keys(cursor.as_mut()), vec!["c"]);
}

#[test]
fn search_near_reports_direction() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"m").unwrap();
    assert!(matches!(cursor.search_near(), Err(EngineError::NotFound)));

    for key in ["b", "d"] {
        put(session.as_ref(), "table:t", key, key);
    }
    cursor.set_key(b"d").unwrap();
    assert_eq!(cursor.search_near().unwrap(), 0);
    cursor.set_key(b"c").unwrap();
    assert_eq!(cursor.search_near().unwrap(), 1);
    assert_eq!(cursor.get_key().unwrap(), b"d");
    cursor.set_key(b"z").unwrap();
    assert_eq!(cursor.search_near().unwrap(), -1);
    assert_eq!(cursor.get_key().unwrap(), b"d");
}

#[test]
fn raw_cursor_exchanges_packed_items() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    put(session.as_ref(), "table:t", "k", "v");

    let mut raw = session.open_cursor("table:t", "raw=true").unwrap();
    raw.next().unwrap();
    assert_eq!(raw.get_key().unwrap(), b"k\0");
    assert_eq!(raw.get_value().unwrap(), b"v\0");
    assert!(raw.set_key(b"no-terminator").is_err());
}

#[test]
fn rejected_item_discards_staged_pair() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "key_format=S,value_format=S").unwrap();

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"a").unwrap();
    cursor.set_value(b"1").unwrap();
    cursor.set_key(b"b").unwrap();
    assert!(cursor.set_value(b"x\0y").is_err());
    let err = cursor.insert().unwrap_err();
    assert!(err.to_string().contains("key not set"));

    cursor.set_key(b"c").unwrap();
    assert!(cursor.set_key(b"bad\0").is_err());
    cursor.set_value(b"2").unwrap();
    assert!(cursor.insert().is_err());
    cursor.close().unwrap();

    assert_eq!(get(session.as_ref(), "table:t", "a"), None);
    assert_eq!(get(session.as_ref(), "table:t", "b"), None);
    assert_eq!(get(session.as_ref(), "table:t", "c"), None);
}

#[test]
fn byte_tables_store_binary_items() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:bin", "key_format=u,value_format=u").unwrap();

    let mut cursor = session.open_cursor("table:bin", "").unwrap();
    cursor.set_key(&[0, 1, 2]).unwrap();
    cursor.set_value(&[255, 0, 255]).unwrap();
    cursor.insert().unwrap();
    cursor.set_key(&[0, 1, 2]).unwrap();
    cursor.search().unwrap();
    assert_eq!(cursor.get_value().unwrap(), vec![255, 0, 255]);
}

#[test]
fn transactions_isolate_until_commit() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let writer = conn.open_session("").unwrap();
    let reader = conn.open_session("").unwrap();
    writer.create("table:t", "").unwrap();

    writer.begin_transaction("isolation=snapshot").unwrap();
    put(writer.as_ref(), "table:t", "k", "v");
    assert_eq!(get(writer.as_ref(), "table:t", "k").as_deref(), Some("v"));
    assert_eq!(get(reader.as_ref(), "table:t", "k"), None);

    reader.begin_transaction("").unwrap();
    writer.commit_transaction("").unwrap();
    assert_eq!(get(reader.as_ref(), "table:t", "k"), None);
    reader.rollback_transaction("").unwrap();
    assert_eq!(get(reader.as_ref(), "table:t", "k").as_deref(), Some("v"));
}

#[test]
fn rollback_restores_previous_state() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    put(session.as_ref(), "table:t", "keep", "1");

    session.begin_transaction("").unwrap();
    put(session.as_ref(), "table:t", "temp", "2");
    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"keep").unwrap();
    cursor.remove().unwrap();
    cursor.close().unwrap();
    session.rollback_transaction("").unwrap();

    assert_eq!(get(session.as_ref(), "table:t", "keep").as_deref(), Some("1"));
    assert_eq!(get(session.as_ref(), "table:t", "temp"), None);
}

#[test]
fn transaction_state_errors() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    assert!(session.commit_transaction("").is_err());
    assert!(session.rollback_transaction("").is_err());
    session.begin_transaction("").unwrap();
    assert!(session.begin_transaction("").is_err());
    assert!(session.compact("table:t", "").is_err());
    assert!(session.begin_transaction("isolation=bogus").is_err());
    session.rollback_transaction("").unwrap();
    assert!(session.begin_transaction("priority=500").is_err());
}

#[test]
fn write_conflict_dooms_the_later_writer() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let first = conn.open_session("").unwrap();
    let second = conn.open_session("").unwrap();
    first.create("table:t", "").unwrap();
    put(first.as_ref(), "table:t", "k", "0");

    first.begin_transaction("").unwrap();
    second.begin_transaction("").unwrap();

    let mut a = first.open_cursor("table:t", "").unwrap();
    a.set_key(b"k").unwrap();
    a.set_value(b"first").unwrap();
    a.update().unwrap();

    let mut b = second.open_cursor("table:t", "").unwrap();
    b.set_key(b"k").unwrap();
    b.set_value(b"second").unwrap();
    assert!(b.update().unwrap_err().is_conflict());
    b.set_key(b"other").unwrap();
    b.set_value(b"x").unwrap();
    assert!(b.insert().unwrap_err().is_conflict());
    drop(b);
    assert!(second.commit_transaction("").unwrap_err().is_conflict());

    drop(a);
    first.commit_transaction("").unwrap();
    assert_eq!(get(second.as_ref(), "table:t", "k").as_deref(), Some("first"));
    assert_eq!(get(second.as_ref(), "table:t", "other"), None);
}

#[test]
fn drop_requires_idle_table() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();

    let mut cursor = session.open_cursor("table:t", "").unwrap();
    assert!(matches!(
        session.drop_object("table:t", ""),
        Err(EngineError::Busy { .. })
    ));
    cursor.close().unwrap();
    session.drop_object("table:t", "").unwrap();
    assert!(matches!(
        session.drop_object("table:t", ""),
        Err(EngineError::NoSuchObject { .. })
    ));
    session.drop_object("table:t", "force=true").unwrap();
    assert!(session.open_cursor("table:t", "").is_err());
}

#[test]
fn forced_drop_invalidates_open_cursors() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    let mut cursor = session.open_cursor("table:t", "").unwrap();
    session.drop_object("table:t", "force=true").unwrap();
    session.create("table:t", "").unwrap();
    assert!(matches!(cursor.next(), Err(EngineError::NoSuchObject { .. })));
}

#[test]
fn index_cursor_orders_by_column() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session
        .create("table:indexed", "key_format=S,value_format=S,columns=(id,data)")
        .unwrap();
    session
        .create("index:indexed:data_idx", "columns=(data)")
        .unwrap();
    put(session.as_ref(), "table:indexed", "1", "zebra");
    put(session.as_ref(), "table:indexed", "2", "apple");

    let mut index = session.open_cursor("index:indexed:data_idx", "").unwrap();
    assert_eq!(keys(index.as_mut()), vec!["apple", "zebra"]);
    index.set_key(b"zebra").unwrap();
    index.search().unwrap();
    assert!(index.insert().is_err());

    put(session.as_ref(), "table:indexed", "3", "mango");
    index.reset().unwrap();
    assert_eq!(keys(index.as_mut()), vec!["apple", "mango", "zebra"]);

    assert!(session.create("index:indexed:bad", "columns=(nope)").is_err());
    session.create("table:plain", "").unwrap();
    assert!(session.create("index:plain:i", "columns=(data)").is_err());
}

#[test]
fn statistics_require_configuration() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    assert!(conn.statistics().is_err());
    let session = conn.open_session("").unwrap();
    assert!(session.open_cursor("statistics:", "").is_err());

    let stats_dir = tempdir().unwrap();
    let conn = KvEngine::new()
        .open(stats_dir.path(), "create,statistics=(fast)")
        .unwrap();
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    put(session.as_ref(), "table:t", "k", "v");

    let stats = conn.statistics().unwrap();
    assert!(stats
        .iter()
        .any(|(name, value)| name == "cursor: insert calls" && *value == 1));

    let mut cursor = session.open_cursor("statistics:", "").unwrap();
    let mut seen = 0;
    while cursor.next().is_ok() {
        let value = String::from_utf8(cursor.get_value().unwrap()).unwrap();
        assert!(value.parse::<u64>().is_ok());
        seen += 1;
    }
    assert!(seen > 0);
}

#[test]
fn reopen_restores_checkpointed_state() {
    let dir = tempdir().unwrap();
    {
        let mut conn = open(dir.path());
        let session = conn.open_session("").unwrap();
        session.create("table:t", "columns=(k,v)").unwrap();
        session.create("index:t:by_v", "columns=(v)").unwrap();
        put(session.as_ref(), "table:t", "a", "1");
        conn.checkpoint("").unwrap();
        put(session.as_ref(), "table:t", "b", "2");
        drop(session);
        conn.close("").unwrap();
    }

    let conn = KvEngine::new().open(dir.path(), "").unwrap();
    let session = conn.open_session("").unwrap();
    assert_eq!(get(session.as_ref(), "table:t", "a").as_deref(), Some("1"));
    assert_eq!(get(session.as_ref(), "table:t", "b").as_deref(), Some("2"));
    assert!(session.open_cursor("index:t:by_v", "").is_ok());
}

#[test]
fn second_connection_is_locked_out() {
    let dir = tempdir().unwrap();
    let mut conn = open(dir.path());
    let err = KvEngine::new().open(dir.path(), "create").err().unwrap();
    assert!(matches!(err, EngineError::Locked { .. }));
    conn.close("").unwrap();
    assert!(KvEngine::new().open(dir.path(), "").is_ok());
}

#[test]
fn in_memory_leaves_no_files() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("mem");
    let mut conn = KvEngine::new().open(&home, "in_memory=true").unwrap();
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    conn.checkpoint("name=first").unwrap();
    conn.close("").unwrap();
    assert!(!home.exists());
}

#[test]
fn closing_connection_invalidates_children() {
    let dir = tempdir().unwrap();
    let mut conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    let mut cursor = session.open_cursor("table:t", "").unwrap();
    conn.close("").unwrap();
    conn.close("").unwrap();

    assert!(matches!(cursor.next(), Err(EngineError::Closed)));
    assert!(matches!(session.create("table:u", ""), Err(EngineError::Closed)));
    assert!(matches!(conn.open_session(""), Err(EngineError::Closed)));
}

#[test]
fn session_close_rolls_back_and_releases_cursors() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let admin = conn.open_session("").unwrap();
    admin.create("table:t", "").unwrap();

    let mut session = conn.open_session("").unwrap();
    session.begin_transaction("").unwrap();
    put(session.as_ref(), "table:t", "k", "v");
    let _cursor = session.open_cursor("table:t", "").unwrap();
    session.close("").unwrap();
    session.close("").unwrap();

    assert_eq!(get(admin.as_ref(), "table:t", "k"), None);
    admin.drop_object("table:t", "").unwrap();
}

#[test]
fn session_max_is_enforced() {
    let dir = tempdir().unwrap();
    let conn = KvEngine::new()
        .open(dir.path(), "create,session_max=2")
        .unwrap();
    let first = conn.open_session("").unwrap();
    let _second = conn.open_session("").unwrap();
    assert!(matches!(
        conn.open_session("").err().unwrap(),
        EngineError::Busy { .. }
    ));
    drop(first);
    assert!(conn.open_session("").is_ok());
}

#[test]
fn session_ids_are_distinct() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let a = conn.open_session("").unwrap();
    let b = conn.open_session("").unwrap();
    assert_ne!(a.native_id(), b.native_id());
    assert!(a.native_id().unwrap().parse::<u64>().unwrap() > 0);
}

#[test]
fn block_compressor_requires_loaded_extension() {
    let dir = tempdir().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session("").unwrap();
    assert!(session
        .create("table:z", "block_compressor=zstd")
        .is_err());

    let module = dir.path().join(crate::extension::module_file_name("zstd"));
    std::fs::write(&module, b"module").unwrap();
    conn.load_extension(&module, "").unwrap();
    session.create("table:z", "block_compressor=zstd").unwrap();
    assert!(session.open_cursor("table:z", "").is_ok());

    assert!(conn
        .load_extension(Path::new("/fake/path/extension.so"), "")
        .is_err());
}

#[test]
fn compact_prunes_history() {
    let dir = tempdir().unwrap();
    let conn = KvEngine::new()
        .open(dir.path(), "create,statistics=(all)")
        .unwrap();
    let session = conn.open_session("").unwrap();
    session.create("table:t", "").unwrap();
    put(session.as_ref(), "table:t", "k", "1");
    let mut cursor = session.open_cursor("table:t", "").unwrap();
    cursor.set_key(b"k").unwrap();
    cursor.remove().unwrap();
    cursor.close().unwrap();

    session.compact("table:t", "timeout=30").unwrap();
    let stats = conn.statistics().unwrap();
    let stored = stats
        .iter()
        .find(|(name, _)| name == "table: t stored keys")
        .map(|(_, v)| *v);
    assert_eq!(stored, Some(0));
    assert!(session.compact("table:missing", "").is_err());
}

#[test]
fn install_dir_prefers_environment() {
    let exe = Some(PathBuf::from("/usr/local/bin/kvlink"));
    assert_eq!(
        resolve_install_dir(Some(OsString::from("/opt/kvlink")), exe.clone()),
        Some(PathBuf::from("/opt/kvlink"))
    );
    assert_eq!(
        resolve_install_dir(Some(OsString::new()), exe.clone()),
        Some(PathBuf::from("/usr/local/bin"))
    );
    assert_eq!(
        resolve_install_dir(None, exe),
        Some(PathBuf::from("/usr/local/bin"))
    );
    assert_eq!(resolve_install_dir(None, None), None);
}

#[test]
fn default_engine_has_an_install_dir() {
    let engine = KvEngine::new();
    assert!(engine.install_dir().is_some());
    let explicit = KvEngine::with_install_dir("/opt/kvlink");
    assert_eq!(explicit.install_dir(), Some(Path::new("/opt/kvlink")));
}
