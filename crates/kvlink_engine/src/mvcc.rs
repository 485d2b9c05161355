//! Multi-version records.
//!
//! Every key maps to a [`VersionChain`], oldest version first. A version is
//! owned by the transaction that wrote it until commit stamps it with a
//! commit sequence number; rollback removes it. Readers pick the newest
//! version their [`ReadView`] can see.

use crate::error::{EngineError, EngineResult};

/// Transaction identifier. Zero is reserved for autocommit writes.
pub type TxnId = u64;

/// Commit sequence number.
pub type CommitSeq = u64;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Reads see the state committed when the transaction began.
    #[default]
    Snapshot,
    /// Reads see the latest committed state.
    ReadCommitted,
    /// Reads see the latest state, committed or not.
    ReadUncommitted,
}

impl Isolation {
    /// Parses an isolation name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unknown names.
    pub fn parse(name: &str) -> EngineResult<Self> {
        match name {
            "snapshot" => Ok(Self::Snapshot),
            "read-committed" => Ok(Self::ReadCommitted),
            "read-uncommitted" => Ok(Self::ReadUncommitted),
            other => Err(EngineError::invalid_config(format!(
                "unknown isolation level '{other}'"
            ))),
        }
    }

    /// The configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::ReadCommitted => "read-committed",
            Self::ReadUncommitted => "read-uncommitted",
        }
    }
}

/// One version of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Writing transaction.
    pub txn: TxnId,
    /// Commit sequence, once committed.
    pub commit: Option<CommitSeq>,
    /// Stored value, `None` for a deletion.
    pub value: Option<Vec<u8>>,
}

/// What a reader is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadView {
    /// Reader's own transaction, if any.
    pub txn: Option<TxnId>,
    /// Latest commit visible under snapshot isolation.
    pub snapshot: CommitSeq,
    /// Isolation level.
    pub isolation: Isolation,
}

impl ReadView {
    /// A view of everything committed, used outside transactions.
    #[must_use]
    pub const fn committed() -> Self {
        Self {
            txn: None,
            snapshot: CommitSeq::MAX,
            isolation: Isolation::ReadCommitted,
        }
    }

    /// A view of the state committed at `snapshot`.
    #[must_use]
    pub const fn at(snapshot: CommitSeq) -> Self {
        Self {
            txn: None,
            snapshot,
            isolation: Isolation::Snapshot,
        }
    }

    fn sees(&self, version: &Version) -> bool {
        if self.txn == Some(version.txn) && version.commit.is_none() {
            return true;
        }
        match (version.commit, self.isolation) {
            (None, Isolation::ReadUncommitted) => true,
            (None, _) => false,
            (Some(seq), Isolation::Snapshot) => seq <= self.snapshot,
            (Some(_), _) => true,
        }
    }
}

/// The versions of one key, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    /// A chain holding one committed value.
    #[must_use]
    pub fn committed(value: Vec<u8>, commit: CommitSeq) -> Self {
        Self {
            versions: vec![Version {
                txn: 0,
                commit: Some(commit),
                value: Some(value),
            }],
        }
    }

    /// Returns true if no versions remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Returns true if any version is still uncommitted.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.versions.iter().any(|v| v.commit.is_none())
    }

    /// The value visible to `view`, if the key exists for it.
    #[must_use]
    pub fn read(&self, view: &ReadView) -> Option<&[u8]> {
        self.versions
            .iter()
            .rev()
            .find(|v| view.sees(v))
            .and_then(|v| v.value.as_deref())
    }

    /// Checks that `view` may write a new version.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another transaction holds an uncommitted
    /// version, or if a snapshot transaction would overwrite a version
    /// committed after its snapshot.
    pub fn check_writable(&self, view: &ReadView) -> EngineResult<()> {
        let Some(newest) = self.versions.last() else {
            return Ok(());
        };
        match newest.commit {
            None if view.txn == Some(newest.txn) => Ok(()),
            None => Err(EngineError::Conflict),
            Some(seq) => {
                if view.txn.is_some()
                    && view.isolation == Isolation::Snapshot
                    && seq > view.snapshot
                {
                    Err(EngineError::Conflict)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Writes an uncommitted version for `txn`, replacing its earlier one.
    pub fn write(&mut self, txn: TxnId, value: Option<Vec<u8>>) {
        if let Some(newest) = self.versions.last_mut() {
            if newest.txn == txn && newest.commit.is_none() {
                newest.value = value;
                return;
            }
        }
        self.versions.push(Version {
            txn,
            commit: None,
            value,
        });
    }

    /// Writes a version that is committed immediately.
    pub fn write_committed(&mut self, value: Option<Vec<u8>>, commit: CommitSeq) {
        self.versions.push(Version {
            txn: 0,
            commit: Some(commit),
            value,
        });
    }

    /// Commits the versions written by `txn`.
    pub fn stamp(&mut self, txn: TxnId, commit: CommitSeq) {
        for version in &mut self.versions {
            if version.txn == txn && version.commit.is_none() {
                version.commit = Some(commit);
            }
        }
    }

    /// Removes the versions written by `txn`.
    pub fn abort(&mut self, txn: TxnId) {
        self.versions
            .retain(|v| !(v.txn == txn && v.commit.is_none()));
    }

    /// Drops committed versions that no reader at or after `oldest` can see.
    ///
    /// Returns the number of versions removed. A chain whose only survivor
    /// is a committed deletion becomes empty.
    pub fn prune(&mut self, oldest: CommitSeq) -> usize {
        let before = self.versions.len();
        let keep_from = self
            .versions
            .iter()
            .rposition(|v| v.commit.is_some_and(|seq| seq <= oldest));
        if let Some(idx) = keep_from {
            self.versions.drain(..idx);
            if self.versions.len() == 1 && self.versions[0].value.is_none() {
                self.versions.clear();
            }
        }
        before - self.versions.len()
    }

    /// Number of stored versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn_view(txn: TxnId, snapshot: CommitSeq, isolation: Isolation) -> ReadView {
        ReadView {
            txn: Some(txn),
            snapshot,
            isolation,
        }
    }

    #[test]
    fn own_writes_are_visible_only_to_owner() {
        let mut chain = VersionChain::committed(b"old".to_vec(), 1);
        chain.write(7, Some(b"new".to_vec()));

        let owner = txn_view(7, 1, Isolation::Snapshot);
        let other = txn_view(8, 1, Isolation::Snapshot);
        assert_eq!(chain.read(&owner), Some(&b"new"[..]));
        assert_eq!(chain.read(&other), Some(&b"old"[..]));
        assert_eq!(chain.read(&ReadView::committed()), Some(&b"old"[..]));

        let dirty = txn_view(8, 1, Isolation::ReadUncommitted);
        assert_eq!(chain.read(&dirty), Some(&b"new"[..]));
    }

    #[test]
    fn snapshot_hides_later_commits() {
        let mut chain = VersionChain::committed(b"v1".to_vec(), 1);
        chain.write_committed(Some(b"v2".to_vec()), 5);

        assert_eq!(chain.read(&ReadView::at(3)), Some(&b"v1"[..]));
        assert_eq!(chain.read(&ReadView::at(5)), Some(&b"v2"[..]));
        let rc = txn_view(9, 3, Isolation::ReadCommitted);
        assert_eq!(chain.read(&rc), Some(&b"v2"[..]));
    }

    #[test]
    fn deletion_hides_key() {
        let mut chain = VersionChain::committed(b"v".to_vec(), 1);
        chain.write_committed(None, 2);
        assert_eq!(chain.read(&ReadView::committed()), None);
        assert_eq!(chain.read(&ReadView::at(1)), Some(&b"v"[..]));
    }

    #[test]
    fn uncommitted_versions_conflict() {
        let mut chain = VersionChain::default();
        chain.write(1, Some(b"a".to_vec()));
        assert!(chain.check_writable(&txn_view(1, 0, Isolation::Snapshot)).is_ok());
        assert!(matches!(
            chain.check_writable(&txn_view(2, 0, Isolation::Snapshot)),
            Err(EngineError::Conflict)
        ));
        assert!(chain.check_writable(&ReadView::committed()).is_err());
    }

    #[test]
    fn snapshot_writer_conflicts_with_newer_commit() {
        let mut chain = VersionChain::committed(b"a".to_vec(), 4);
        assert!(chain.check_writable(&txn_view(1, 3, Isolation::Snapshot)).is_err());
        assert!(chain.check_writable(&txn_view(1, 4, Isolation::Snapshot)).is_ok());
        assert!(chain
            .check_writable(&txn_view(1, 3, Isolation::ReadCommitted))
            .is_ok());
        chain.write_committed(Some(b"b".to_vec()), 5);
        assert!(chain.check_writable(&ReadView::committed()).is_ok());
    }

    #[test]
    fn stamp_and_abort() {
        let mut chain = VersionChain::committed(b"a".to_vec(), 1);
        chain.write(3, Some(b"b".to_vec()));
        chain.write(3, Some(b"c".to_vec()));
        assert_eq!(chain.len(), 2);

        let mut aborted = chain.clone();
        aborted.abort(3);
        assert_eq!(aborted.read(&ReadView::committed()), Some(&b"a"[..]));
        assert!(!aborted.has_pending());

        chain.stamp(3, 2);
        assert!(!chain.has_pending());
        assert_eq!(chain.read(&ReadView::committed()), Some(&b"c"[..]));
        assert_eq!(chain.read(&ReadView::at(1)), Some(&b"a"[..]));
    }

    #[test]
    fn prune_keeps_what_readers_need() {
        let mut chain = VersionChain::committed(b"1".to_vec(), 1);
        chain.write_committed(Some(b"2".to_vec()), 2);
        chain.write_committed(Some(b"3".to_vec()), 3);

        assert_eq!(chain.prune(2), 1);
        assert_eq!(chain.read(&ReadView::at(2)), Some(&b"2"[..]));
        assert_eq!(chain.prune(10), 1);
        assert_eq!(chain.len(), 1);

        chain.write_committed(None, 11);
        chain.prune(11);
        assert!(chain.is_empty());
    }

    #[test]
    fn isolation_names() {
        for name in ["snapshot", "read-committed", "read-uncommitted"] {
            assert_eq!(Isolation::parse(name).unwrap().as_str(), name);
        }
        assert!(Isolation::parse("serializable").is_err());
    }
}
