use crate::commitlog;
use crate::commitlog::Index;
use crate::replica::write_ahead_log::commit_stream::CommitStreamPublisher;
use crate::replica::write_ahead_log::{EntryPayload, RaftLogEntry};
use crate::replica::Term;
use std::io;

/// WriteAheadLog is the raft-specific log facade.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to majority
/// 2. Committed - written to disk, replicated to majority
/// 3. Applied - a committed entry that has also been applied to the state machine
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
///
/// Entries up to and including the snapshot base have been compacted away. The base still
/// answers term lookups so that the consistency check works across the compaction boundary.
pub(in super::super) struct WriteAheadLog<L>
where
    L: commitlog::Log<RaftLogEntry>,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    // Metadata about the highest log entry that we've locally written (or the snapshot base if
    // every entry is compacted). It must be updated atomically.
    latest_entry_metadata: Option<(Term, Index)>,
    // Last entry covered by the local snapshot.
    snapshot_base: Option<(Term, Index)>,

    // Commit stream to publish committed data entries to.
    commit_stream: CommitStreamPublisher,
    // Index of highest log entry known to be committed. None if nothing is committed.
    commit_index: Option<Index>,
    // Index of highest log entry applied. None if nothing is applied.
    last_applied_index: Option<Index>,
}

/// A committed control entry, handed back to the replica to apply in log order.
#[derive(Debug)]
pub(in super::super) struct AppliedControl {
    pub(in super::super) index: Index,
    pub(in super::super) payload: EntryPayload,
}

impl<L> WriteAheadLog<L>
where
    L: commitlog::Log<RaftLogEntry>,
{
    pub(super) fn new(
        logger: slog::Logger,
        mut log: L,
        commit_stream: CommitStreamPublisher,
        snapshot_base: Option<(Term, Index)>,
        last_applied_index: Option<Index>,
    ) -> Result<Self, io::Error> {
        if let Some((_, base_index)) = snapshot_base {
            log.drop_until(base_index);
        }

        let latest_entry_metadata = match log.next_index().checked_minus(1) {
            Some(last_index) if last_index >= log.first_index() => {
                let entry = log.read(last_index)?.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "log store lost its last entry")
                })?;
                Some((entry.term, last_index))
            }
            _ => snapshot_base,
        };

        let latest_index = latest_entry_metadata.map(|(_, index)| index);
        if last_applied_index > latest_index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "last applied index {:?} is past the end of the log {:?}",
                    last_applied_index, latest_index
                ),
            ));
        }

        // Everything applied was committed. The snapshot base was applied before it was taken.
        let base_index = snapshot_base.map(|(_, index)| index);
        let last_applied_index = std::cmp::max(last_applied_index, base_index);

        Ok(WriteAheadLog {
            logger,
            log,
            latest_entry_metadata,
            snapshot_base,
            commit_stream,
            commit_index: last_applied_index,
            last_applied_index,
        })
    }

    pub(crate) fn latest_entry(&self) -> Option<(Term, Index)> {
        self.latest_entry_metadata
    }

    pub(crate) fn latest_index(&self) -> Option<Index> {
        self.latest_entry_metadata.map(|(_, index)| index)
    }

    pub(crate) fn snapshot_base(&self) -> Option<(Term, Index)> {
        self.snapshot_base
    }

    /// First index still held by the log. Anything earlier must be sent as a snapshot.
    pub(crate) fn first_index(&self) -> Index {
        self.log.first_index()
    }

    pub(crate) fn read(&self, index: Index) -> Result<Option<RaftLogEntry>, io::Error> {
        self.log.read(index)
    }

    /// Term of the entry at `index`, including the compacted snapshot base.
    pub(crate) fn read_term(&self, index: Index) -> Result<Option<Term>, io::Error> {
        if let Some((base_term, base_index)) = self.snapshot_base {
            if index == base_index {
                return Ok(Some(base_term));
            }
            if index < base_index {
                return Ok(None);
            }
        }
        Ok(self.read(index)?.map(|entry| entry.term))
    }

    /// Read up to `max` consecutive entries starting at `start`.
    pub(crate) fn read_from(&self, start: Index, max: usize) -> Result<Vec<RaftLogEntry>, io::Error> {
        let mut entries = Vec::new();
        let mut index = start;
        while entries.len() < max {
            match self.read(index)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
            index = index.plus(1);
        }
        Ok(entries)
    }

    /// Remove anything starting at `index` and later.
    pub(crate) fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        let new_latest_entry_metadata = match index.checked_minus(1) {
            None => None,
            Some(new_latest_entry_index) => self
                .read_term(new_latest_entry_index)?
                .map(|term| (term, new_latest_entry_index)),
        };

        // Only update log after we've successfully read what new state will be.
        self.log.truncate(index);

        self.latest_entry_metadata = new_latest_entry_metadata;
        Ok(())
    }

    pub(crate) fn append(&mut self, entry: RaftLogEntry) -> Result<Index, io::Error> {
        let appended_term = entry.term;
        let appended_index = self.log.append(entry)?;
        // Only update state after log action completes.
        self.latest_entry_metadata = Some((appended_term, appended_index));

        Ok(appended_index)
    }

    /// Append every payload with `term`, returning the contiguous range they occupy. On error the
    /// partially written suffix is truncated away again so the log and in-memory state agree.
    pub(crate) fn append_batch(
        &mut self,
        term: Term,
        payloads: Vec<EntryPayload>,
    ) -> Result<Option<(Index, Index)>, io::Error> {
        let previous_latest = self.latest_entry_metadata;
        let first_index = self.log.next_index();

        let mut last_index = None;
        for payload in payloads {
            match self.append(RaftLogEntry { term, payload }) {
                Ok(index) => last_index = Some(index),
                Err(e) => {
                    self.log.truncate(first_index);
                    self.latest_entry_metadata = previous_latest;
                    return Err(e);
                }
            }
        }

        Ok(last_index.map(|last| (first_index, last)))
    }

    pub(crate) fn commit_index(&self) -> Option<Index> {
        self.commit_index
    }

    pub(crate) fn last_applied_index(&self) -> Option<Index> {
        self.last_applied_index
    }

    /// Leader side: > If there exists an N such that N > commitIndex, a majority
    /// > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
    /// > set commitIndex = N (§5.3, §5.4).
    ///
    /// Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_valid(
        &mut self,
        tentative_new_commit_index: Index,
        current_term: Term,
    ) -> Result<bool, io::Error> {
        if matches!(self.commit_index, Some(ci) if tentative_new_commit_index <= ci) {
            return Ok(false);
        }

        match self.read_term(tentative_new_commit_index)? {
            Some(term) if term == current_term => {}
            _ => return Ok(false),
        }

        Ok(self.ratchet_fwd_commit_index_if_changed(tentative_new_commit_index))
    }

    /// Follower side. Indexes at or below the current commit index are ignored, and the commit
    /// index never moves past the local log. Returns true if the commit index moved.
    pub(crate) fn ratchet_fwd_commit_index_if_changed(&mut self, new_commit_index: Index) -> bool {
        if matches!(self.commit_index, Some(ci) if new_commit_index <= ci) {
            return false;
        }

        match self.latest_index() {
            Some(latest) if latest >= new_commit_index => {
                self.commit_index.replace(new_commit_index);
                true
            }
            _ => {
                slog::warn!(
                    self.logger,
                    "Not committing {:?}, past our local log {:?}",
                    new_commit_index,
                    self.latest_entry_metadata
                );
                false
            }
        }
    }

    /// apply_all_committed_entries applies all committed but unapplied entries in order. Data
    /// entries are published to the commit stream. Control entries are returned, in order, for the
    /// caller to apply.
    pub(crate) fn apply_all_committed_entries(&mut self) -> Result<Vec<AppliedControl>, io::Error> {
        let mut controls = Vec::new();

        let commit_index = match self.commit_index {
            Some(ci) => ci,
            None => return Ok(controls),
        };

        while self.last_applied_index < Some(commit_index) {
            let next_index = match self.last_applied_index {
                None => Index::start_index(),
                Some(applied) => applied.plus(1),
            };
            let entry = self.log.read(next_index)?.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("committed entry {:?} is missing from the log", next_index),
                )
            })?;

            match entry.payload {
                EntryPayload::Data(data) => {
                    self.commit_stream
                        .notify_commit(&self.logger, entry.term, next_index, data)
                }
                payload => controls.push(AppliedControl {
                    index: next_index,
                    payload,
                }),
            }
            self.last_applied_index.replace(next_index);
        }

        Ok(controls)
    }

    /// Compact away every entry up to and including `index`, which must already be applied.
    pub(crate) fn compact_until(&mut self, index: Index) -> Result<(Term, Index), io::Error> {
        if self.last_applied_index < Some(index) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("can't compact {:?}, last applied is {:?}", index, self.last_applied_index),
            ));
        }
        let term = self.read_term(index)?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("can't compact {:?}, entry is already compacted", index),
            )
        })?;

        self.log.drop_until(index);
        self.snapshot_base = Some((term, index));
        if self.latest_index() < Some(index) {
            self.latest_entry_metadata = self.snapshot_base;
        }

        Ok((term, index))
    }

    /// Replace the whole log with an installed snapshot ending at `(term, index)`.
    pub(crate) fn reset_to_snapshot(&mut self, term: Term, index: Index) {
        self.log.truncate(self.log.first_index());
        self.log.drop_until(index);

        self.snapshot_base = Some((term, index));
        self.latest_entry_metadata = self.snapshot_base;
        self.commit_index = Some(index);
        self.last_applied_index = Some(index);
    }
}
