//! Transaction bookkeeping.

use crate::mvcc::{CommitSeq, Isolation, ReadView, TxnId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// An explicit transaction running on a session.
#[derive(Debug)]
pub struct Txn {
    view: ReadView,
    name: Option<String>,
    writes: BTreeSet<(String, Vec<u8>)>,
    failed: bool,
}

impl Txn {
    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.view.txn.unwrap_or_default()
    }

    /// The transaction's read view.
    #[must_use]
    pub fn view(&self) -> ReadView {
        self.view
    }

    /// Optional transaction name, for logs.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Records a key written by this transaction.
    pub fn record_write(&mut self, table: &str, key: &[u8]) {
        self.writes.insert((table.to_string(), key.to_vec()));
    }

    /// Keys written by this transaction.
    pub fn writes(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.writes.iter().map(|(t, k)| (t.as_str(), k.as_slice()))
    }

    /// Marks the transaction as doomed after a conflict.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Returns true if the transaction can only be rolled back.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

/// Allocates transaction ids and commit sequence numbers.
///
/// Commit sequence numbers are only advanced while the caller holds the
/// catalog write lock, so a reader never observes a half-stamped commit.
#[derive(Debug)]
pub struct TxnManager {
    next_txn: AtomicU64,
    last_commit: AtomicU64,
    active: Mutex<BTreeMap<TxnId, CommitSeq>>,
}

impl TxnManager {
    /// Creates a manager resuming after `last_commit`.
    #[must_use]
    pub fn new(last_commit: CommitSeq) -> Self {
        Self {
            next_txn: AtomicU64::new(1),
            last_commit: AtomicU64::new(last_commit),
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Starts a transaction with a snapshot of the latest commit.
    pub fn begin(&self, isolation: Isolation, name: Option<String>) -> Txn {
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.last_commit.load(Ordering::SeqCst);
        self.active.lock().insert(id, snapshot);
        Txn {
            view: ReadView {
                txn: Some(id),
                snapshot,
                isolation,
            },
            name,
            writes: BTreeSet::new(),
            failed: false,
        }
    }

    /// Allocates the next commit sequence number.
    pub fn next_commit(&self) -> CommitSeq {
        self.last_commit.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Forgets a finished transaction.
    pub fn finish(&self, txn: &Txn) {
        self.active.lock().remove(&txn.id());
    }

    /// Latest commit sequence.
    #[must_use]
    pub fn last_commit(&self) -> CommitSeq {
        self.last_commit.load(Ordering::SeqCst)
    }

    /// Oldest snapshot any running transaction may read at.
    #[must_use]
    pub fn oldest_snapshot(&self) -> CommitSeq {
        self.active
            .lock()
            .values()
            .copied()
            .min()
            .unwrap_or_else(|| self.last_commit())
    }

    /// Number of running transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_track_commits() {
        let manager = TxnManager::new(10);
        let first = manager.begin(Isolation::Snapshot, None);
        assert_eq!(first.view().snapshot, 10);

        assert_eq!(manager.next_commit(), 11);
        let second = manager.begin(Isolation::Snapshot, Some("second".into()));
        assert_eq!(second.view().snapshot, 11);
        assert_ne!(first.id(), second.id());
        assert_eq!(second.name(), Some("second"));

        assert_eq!(manager.oldest_snapshot(), 10);
        manager.finish(&first);
        assert_eq!(manager.oldest_snapshot(), 11);
        manager.finish(&second);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.oldest_snapshot(), 11);
    }

    #[test]
    fn writes_are_deduplicated() {
        let manager = TxnManager::new(0);
        let mut txn = manager.begin(Isolation::Snapshot, None);
        txn.record_write("t", b"k");
        txn.record_write("t", b"k");
        txn.record_write("u", b"k");
        assert_eq!(txn.writes().count(), 2);
        assert!(!txn.is_failed());
        txn.mark_failed();
        assert!(txn.is_failed());
    }
}
