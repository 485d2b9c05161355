//! Integration tests for connection and session lifecycles.

use kvlink_core::{
    CheckpointConfig, Connection, ConnectionConfig, CoreError, CursorConfig, DropConfig,
    EngineError, ExtensionConfig, ExtensionDiscovery, IndexConfig, LoadOutcome,
    StatisticsLevel, TableConfig,
};
use kvlink_engine::KvEngine;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> ConnectionConfig {
    ConnectionConfig::new().extensions(ExtensionDiscovery::disabled())
}

fn open(dir: &Path) -> Connection {
    let conn = Connection::new();
    conn.open(dir, &config()).unwrap();
    conn
}

#[test]
fn connection_state_machine() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::new();
    assert!(!conn.is_open());
    assert!(matches!(conn.open_session(), Err(CoreError::NotOpen)));
    assert!(matches!(conn.checkpoint(), Err(CoreError::NotOpen)));

    conn.open(dir.path(), &config()).unwrap();
    assert!(conn.is_open());
    assert_eq!(conn.home().as_deref(), Some(dir.path()));
    assert!(matches!(
        conn.open(dir.path(), &config()),
        Err(CoreError::AlreadyOpen)
    ));

    conn.close().unwrap();
    assert!(!conn.is_open());
    assert!(matches!(conn.open_session(), Err(CoreError::ConnectionClosed)));
    assert!(matches!(
        conn.open(dir.path(), &config()),
        Err(CoreError::ConnectionClosed)
    ));
    conn.close().unwrap();
}

#[test]
fn open_reports_engine_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");
    let conn = Connection::new();
    let err = conn.open(&missing, &config().create(false)).unwrap_err();
    assert!(matches!(err, CoreError::Engine(_)));
    assert!(!conn.is_open());

    let conn = Connection::new();
    let err = conn.open(dir.path(), &config().session_max(0)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Engine(EngineError::InvalidConfig { .. })
    ));
}

#[test]
fn connection_close_releases_every_session() {
    for n in [0usize, 1, 5] {
        let dir = TempDir::new().unwrap();
        let conn = open(dir.path());
        let sessions: Vec<_> = (0..n).map(|_| conn.open_session().unwrap()).collect();
        assert_eq!(conn.session_count(), n);

        conn.close().unwrap();
        assert_eq!(conn.session_count(), 0);
        for session in &sessions {
            assert!(session.is_closed());
            assert!(matches!(
                session.begin_transaction(),
                Err(CoreError::SessionClosed(id)) if id == session.id()
            ));
        }
        for mut session in sessions {
            session.close().unwrap();
        }
    }
}

#[test]
fn session_close_is_idempotent_and_deregisters() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let mut first = conn.open_session().unwrap();
    let second = conn.open_session().unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(conn.session_ids(), vec![first.id(), second.id()]);

    first.close().unwrap();
    first.close().unwrap();
    assert!(first.is_closed());
    assert_eq!(conn.session_ids(), vec![second.id()]);

    drop(second);
    assert_eq!(conn.session_count(), 0);
    conn.close().unwrap();
}

#[test]
fn cursor_outlived_by_connection_close() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session().unwrap();
    session.create_table("t", &TableConfig::new()).unwrap();
    let mut cursor = session.open_cursor("t").unwrap();
    cursor.set("k", "v").unwrap();
    cursor.insert().unwrap();

    conn.close().unwrap();
    assert!(matches!(cursor.next(), Err(CoreError::SessionClosed(_))));
    cursor.close().unwrap();
    assert!(matches!(cursor.next(), Err(CoreError::CursorClosed { .. })));
}

#[test]
fn sessions_survive_their_connection_being_dropped() {
    let dir = TempDir::new().unwrap();
    let mut session = {
        let conn = open(dir.path());
        conn.open_session().unwrap()
    };
    assert!(session.is_closed());
    session.close().unwrap();
}

#[test]
fn reopen_restores_tables() {
    let dir = TempDir::new().unwrap();
    {
        let conn = open(dir.path());
        let session = conn.open_session().unwrap();
        session.create_table("users", &TableConfig::new()).unwrap();
        let mut cursor = session.open_cursor("users").unwrap();
        cursor.set("alice", "1").unwrap();
        cursor.insert().unwrap();
        cursor.close().unwrap();
        conn.checkpoint().unwrap();
        conn.checkpoint_with(&CheckpointConfig::new().name("after-insert"))
            .unwrap();
        conn.close().unwrap();
    }

    let conn = Connection::new();
    conn.open(dir.path(), &config().create(false)).unwrap();
    let session = conn.open_session().unwrap();
    let mut cursor = session.open_cursor("users").unwrap();
    assert_eq!(cursor.search("alice").unwrap().as_deref(), Some("1"));
}

#[test]
fn second_connection_on_same_home_is_locked() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let other = Connection::new();
    let err = other.open(dir.path(), &config()).unwrap_err();
    assert!(matches!(err, CoreError::Engine(EngineError::Locked { .. })));
    conn.close().unwrap();
    other.open(dir.path(), &config()).unwrap();
}

#[test]
fn explicit_extension_load_failures_propagate() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let err = conn
        .load_extension("/fake/path/extension.so", &ExtensionConfig::new())
        .unwrap_err();
    assert!(err.to_string().contains("failed to load extension"));
    assert!(matches!(err, CoreError::ExtensionLoad { .. }));
}

#[test]
fn discovery_loads_available_compressors() {
    let home = TempDir::new().unwrap();
    let ext = TempDir::new().unwrap();
    let zstd = ext.path().join("zstd");
    fs::create_dir_all(&zstd).unwrap();
    fs::write(zstd.join(kvlink_engine::module_file_name("zstd")), b"module").unwrap();

    let conn = Connection::new();
    let discovery = ExtensionDiscovery::default().directory(ext.path());
    conn.open(home.path(), &ConnectionConfig::new().extensions(discovery))
        .unwrap();

    let report = conn.extension_report().unwrap();
    assert_eq!(report.loaded().collect::<Vec<_>>(), vec!["zstd"]);
    assert!(report
        .attempts()
        .iter()
        .filter(|p| p.compressor != "zstd")
        .all(|p| p.outcome == LoadOutcome::Missing));

    let session = conn.open_session().unwrap();
    session
        .create_table("compressed", &TableConfig::new().block_compressor("zstd"))
        .unwrap();
    let err = session
        .create_table("other", &TableConfig::new().block_compressor("lz4"))
        .unwrap_err();
    assert!(matches!(err, CoreError::Engine(_)));
}

#[test]
fn discovery_defaults_to_engine_install_dir() {
    let home = TempDir::new().unwrap();
    let install = TempDir::new().unwrap();
    let compressors = install.path().join("ext").join("compressors");
    let lz4 = compressors.join("lz4");
    fs::create_dir_all(&lz4).unwrap();
    fs::write(lz4.join(kvlink_engine::module_file_name("lz4")), b"module").unwrap();

    let conn = Connection::with_engine(Arc::new(KvEngine::with_install_dir(install.path())));
    conn.open(home.path(), &ConnectionConfig::new()).unwrap();

    let report = conn.extension_report().unwrap();
    assert_eq!(report.attempts().len(), kvlink_engine::KNOWN_COMPRESSORS.len());
    assert!(report.attempts().iter().all(|a| a.path.starts_with(&compressors)));
    assert_eq!(report.loaded().collect::<Vec<_>>(), vec!["lz4"]);
}

#[test]
fn default_discovery_misses_are_harmless() {
    let dir = TempDir::new().unwrap();
    let conn = Connection::new();
    conn.open(dir.path(), &ConnectionConfig::new()).unwrap();
    let report = conn.extension_report().unwrap();
    assert_eq!(report.attempts().len(), kvlink_engine::KNOWN_COMPRESSORS.len());
    assert_eq!(report.loaded().count(), 0);
    let session = conn.open_session().unwrap();
    session.create_table("t", &TableConfig::new()).unwrap();
}

#[test]
fn explicit_load_enables_block_compressor() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let module = dir.path().join(kvlink_engine::module_file_name("snappy"));
    fs::write(&module, b"module").unwrap();
    conn.load_extension(&module, &ExtensionConfig::new()).unwrap();

    let session = conn.open_session().unwrap();
    session
        .create_table("t", &TableConfig::new().block_compressor("snappy"))
        .unwrap();
}

#[test]
fn drop_busy_unless_forced() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session().unwrap();
    session.create_table("t", &TableConfig::new()).unwrap();

    let cursor = session.open_cursor("t").unwrap();
    let err = session.drop_object("table:t", &DropConfig::new()).unwrap_err();
    assert!(err.is_busy());
    drop(cursor);

    session.drop_object("table:t", &DropConfig::new()).unwrap();
    assert!(session.drop_object("table:t", &DropConfig::new()).is_err());
    session
        .drop_object("table:t", &DropConfig::new().force(true))
        .unwrap();
}

#[test]
fn index_requires_named_columns() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session().unwrap();
    session.create_table("plain", &TableConfig::new()).unwrap();
    assert!(session
        .create_index("index:plain:by_value", &IndexConfig::new(["value"]))
        .is_err());

    session
        .create_table("people", &TableConfig::new().columns(["name", "city"]))
        .unwrap();
    session
        .create_index("index:people:by_city", &IndexConfig::new(["city"]))
        .unwrap();
    let mut people = session.open_cursor("people").unwrap();
    for (name, city) in [("ann", "oslo"), ("bob", "lima"), ("cyd", "kyiv")] {
        people.set(name, city).unwrap();
        people.insert().unwrap();
    }

    let mut by_city = session
        .open_cursor_with_config("index:people:by_city", &CursorConfig::new())
        .unwrap();
    let cities: Vec<_> = by_city.records().map(|r| r.unwrap().key).collect();
    assert_eq!(cities, vec!["kyiv", "lima", "oslo"]);
    by_city.set("x", "y").unwrap_err();
}

#[test]
fn statistics_need_configuration() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    assert!(conn.statistics().is_err());
    conn.close().unwrap();

    let conn = Connection::new();
    conn.open(dir.path(), &config().statistics(StatisticsLevel::Fast))
        .unwrap();
    let _session = conn.open_session().unwrap();
    let stats = conn.statistics().unwrap();
    assert!(stats
        .iter()
        .any(|(name, value)| name == "session: open session count" && *value == 1));
}

#[test]
fn compact_runs_outside_transactions() {
    let dir = TempDir::new().unwrap();
    let conn = open(dir.path());
    let session = conn.open_session().unwrap();
    session.create_table("t", &TableConfig::new()).unwrap();
    session.compact("table:t", &Default::default()).unwrap();
    session.begin_transaction().unwrap();
    assert!(session.compact("table:t", &Default::default()).is_err());
    session.rollback_transaction().unwrap();
}
