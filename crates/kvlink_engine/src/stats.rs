//! Engine statistics.
//!
//! Counters are always maintained; they are only exposed when the connection
//! was opened with `statistics=(fast)` or `statistics=(all)`, through
//! [`RawConnection::statistics`](crate::RawConnection::statistics) and
//! `statistics:` cursors.

use std::sync::atomic::{AtomicU64, Ordering};

/// How much statistics detail a connection exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub enum StatisticsLevel {
    /// Statistics are not exposed.
    #[default]
    None,
    /// Cheap counters.
    Fast,
    /// Every counter, including per-table gauges.
    All,
}

impl StatisticsLevel {
    /// Resolves the `statistics` list of a connection configuration.
    ///
    /// `clear` is accepted and ignored.
    #[must_use]
    pub fn from_list(items: &[String]) -> Option<Self> {
        let mut level = Self::None;
        for item in items {
            match item.as_str() {
                "none" | "clear" => {}
                "fast" => level = level.max(Self::Fast),
                "all" => level = Self::All,
                _ => return None,
            }
        }
        Some(level)
    }
}

/// Operation counters for one connection.
#[derive(Debug, Default)]
pub struct EngineStats {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    cursors_opened: AtomicU64,
    cursor_inserts: AtomicU64,
    cursor_updates: AtomicU64,
    cursor_removes: AtomicU64,
    cursor_searches: AtomicU64,
    cursor_nexts: AtomicU64,
    cursor_prevs: AtomicU64,
    txn_begins: AtomicU64,
    txn_commits: AtomicU64,
    txn_rollbacks: AtomicU64,
    txn_conflicts: AtomicU64,
    checkpoints: AtomicU64,
    versions_pruned: AtomicU64,
}

/// A counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    /// Session opened.
    SessionOpen,
    /// Session closed.
    SessionClose,
    /// Cursor opened.
    CursorOpen,
    /// Cursor insert.
    Insert,
    /// Cursor update.
    Update,
    /// Cursor remove.
    Remove,
    /// Cursor search or search-near.
    Search,
    /// Cursor next.
    Next,
    /// Cursor prev.
    Prev,
    /// Transaction begin.
    Begin,
    /// Transaction commit.
    Commit,
    /// Transaction rollback.
    Rollback,
    /// Write-write conflict.
    Conflict,
    /// Checkpoint written.
    Checkpoint,
}

impl EngineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, stat: Stat) -> &AtomicU64 {
        match stat {
            Stat::SessionOpen => &self.sessions_opened,
            Stat::SessionClose => &self.sessions_closed,
            Stat::CursorOpen => &self.cursors_opened,
            Stat::Insert => &self.cursor_inserts,
            Stat::Update => &self.cursor_updates,
            Stat::Remove => &self.cursor_removes,
            Stat::Search => &self.cursor_searches,
            Stat::Next => &self.cursor_nexts,
            Stat::Prev => &self.cursor_prevs,
            Stat::Begin => &self.txn_begins,
            Stat::Commit => &self.txn_commits,
            Stat::Rollback => &self.txn_rollbacks,
            Stat::Conflict => &self.txn_conflicts,
            Stat::Checkpoint => &self.checkpoints,
        }
    }

    /// Increments a counter.
    pub fn record(&self, stat: Stat) {
        self.counter(stat).fetch_add(1, Ordering::Relaxed);
    }

    /// Adds pruned versions.
    pub fn record_pruned(&self, versions: usize) {
        self.versions_pruned
            .fetch_add(versions as u64, Ordering::Relaxed);
    }

    /// Current value of a counter.
    #[must_use]
    pub fn get(&self, stat: Stat) -> u64 {
        self.counter(stat).load(Ordering::Relaxed)
    }

    /// Named counter values, in a stable order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let opened = load(&self.sessions_opened);
        let closed = load(&self.sessions_closed);
        vec![
            ("session: open session count".into(), opened.saturating_sub(closed)),
            ("session: sessions opened".into(), opened),
            ("cursor: cursors opened".into(), load(&self.cursors_opened)),
            ("cursor: insert calls".into(), load(&self.cursor_inserts)),
            ("cursor: update calls".into(), load(&self.cursor_updates)),
            ("cursor: remove calls".into(), load(&self.cursor_removes)),
            ("cursor: search calls".into(), load(&self.cursor_searches)),
            ("cursor: next calls".into(), load(&self.cursor_nexts)),
            ("cursor: prev calls".into(), load(&self.cursor_prevs)),
            ("transaction: transaction begins".into(), load(&self.txn_begins)),
            ("transaction: transactions committed".into(), load(&self.txn_commits)),
            ("transaction: transactions rolled back".into(), load(&self.txn_rollbacks)),
            ("transaction: update conflicts".into(), load(&self.txn_conflicts)),
            ("transaction: checkpoints".into(), load(&self.checkpoints)),
            ("cache: versions pruned".into(), load(&self.versions_pruned)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = EngineStats::new();
        stats.record(Stat::Insert);
        stats.record(Stat::Insert);
        stats.record(Stat::SessionOpen);
        assert_eq!(stats.get(Stat::Insert), 2);

        let snapshot = stats.snapshot();
        let lookup = |name: &str| snapshot.iter().find(|(n, _)| n == name).map(|(_, v)| *v);
        assert_eq!(lookup("cursor: insert calls"), Some(2));
        assert_eq!(lookup("session: open session count"), Some(1));
    }

    #[test]
    fn statistics_levels() {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(StatisticsLevel::from_list(&list(&["fast"])), Some(StatisticsLevel::Fast));
        assert_eq!(
            StatisticsLevel::from_list(&list(&["all", "clear"])),
            Some(StatisticsLevel::All)
        );
        assert_eq!(StatisticsLevel::from_list(&list(&["none"])), Some(StatisticsLevel::None));
        assert_eq!(StatisticsLevel::from_list(&list(&["bogus"])), None);
    }
}
