use super::{get_cluster_commit_index, Replica, ReplicaOptions};
use crate::actor::Callback;
use crate::commitlog::{opt_index_u64, Index, Log};
use crate::mail::codec::{Decode, Encode};
use crate::mail::{HeartbeatRequest, HeartbeatResponse, RaftMailBuilder, RaftMessage, SnapshotRequest, WireEntry};
use crate::peers::ActorId;
use crate::replica::election::PeerState;
use crate::replica::snapshot::{SnapshotCursor, SnapshotStore};
use crate::replica::write_ahead_log::{EntryPayload, WriteAheadLog};
use crate::replica::{
    LeaderTimerTick, RaftLogEntry, ReplicaRole, RoundKind, Term, WriteLogsError, WriteLogsInput, WriteLogsOutput,
};
use std::collections::HashMap;
use std::io;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub(super) enum PeerRequestError {
    #[error("Entry {0:?} is unexpectedly missing from the log")]
    MissingLogEntry(Index),
    #[error("Failed to read entry {0:?}: {1}")]
    DiskRead(Index, io::Error),
    #[error("Peer needs a snapshot but none exists")]
    NoSnapshot,
    #[error("Failed to read the latest snapshot: {0}")]
    SnapshotRead(io::Error),
}

impl<L> Replica<L>
where
    L: Log<RaftLogEntry> + 'static,
{
    pub(crate) fn handle_write(
        &mut self,
        input: WriteLogsInput,
        callback: Callback<WriteLogsOutput, WriteLogsError>,
    ) {
        if !self.election_state.is_leader() {
            callback.send(Err(WriteLogsError::NotLeader {
                leader: self.election_state.leader(),
            }));
            return;
        }
        if input.batch.is_empty() {
            callback.send(Err(WriteLogsError::EmptyBatch));
            return;
        }

        let term = self.local_state.current_term();
        let payloads = input.batch.into_iter().map(EntryPayload::Data).collect();
        match self.wal.append_batch(term, payloads) {
            Ok(Some((first_index, last_index))) => {
                let output = WriteLogsOutput {
                    term,
                    first_index,
                    last_index,
                };
                self.pending_writes.insert(last_index, (output, callback));
                self.start_heartbeat_round();
            }
            Ok(None) => callback.send(Err(WriteLogsError::EmptyBatch)),
            Err(e) => {
                slog::error!(self.logger, "Failed to append write batch: {:?}", e);
                callback.send(Err(WriteLogsError::LocalIoError(e)));
            }
        }
    }

    pub(crate) fn handle_leader_timer(&mut self, tick: LeaderTimerTick) {
        if tick.term != self.local_state.current_term() || !self.election_state.is_leader() {
            slog::debug!(self.logger, "Ignoring stale leader timer tick {:?}", tick);
            return;
        }

        self.start_heartbeat_round();
    }

    /// One round to every peer: log entries (or a heartbeat) for peers that are caught up on
    /// snapshots, the next snapshot chunk for the rest. The round doubles as a lease round.
    pub(super) fn start_heartbeat_round(&mut self) {
        let current_term = self.local_state.current_term();
        let leader_state = match self.election_state.leader_state_mut() {
            Some(leader_state) => leader_state,
            None => return,
        };
        let round = leader_state.lease.next_round();
        leader_state.reset_heartbeat_timer();

        let mut mails = HashMap::with_capacity(self.quorum.len());
        for peer_id in self.quorum.ids() {
            let peer_state = match leader_state.tracker.peer_state_mut(&peer_id) {
                Some(peer_state) => peer_state,
                None => {
                    slog::warn!(self.logger, "No replication state for {:?}", peer_id);
                    continue;
                }
            };

            match new_peer_request(
                current_term,
                self.my_id,
                round,
                peer_state,
                &self.wal,
                &*self.snapshots,
                &self.options,
            ) {
                Ok(message) => {
                    mails.insert(peer_id, RaftMailBuilder::build(&message));
                }
                Err(e) => slog::warn!(self.logger, "Skipping {:?} this round: {}", peer_id, e),
            }
        }

        self.broadcast(RoundKind::Heartbeat, current_term, round, mails);
        self.advance_commit_index();
    }

    pub(super) fn handle_heartbeat_request(&mut self, request: HeartbeatRequest) -> HeartbeatResponse {
        let success = match self.try_append_entries(&request) {
            Ok(success) => success,
            Err(e) => {
                slog::error!(self.logger, "Failed to append entries from {:?}: {:?}", request.leader, e);
                false
            }
        };

        let match_index = if success {
            let appended = request.prev_log_index + request.entries.len() as u64;
            let base = self.wal.snapshot_base().map(|(_, index)| index.as_u64()).unwrap_or(0);
            std::cmp::max(appended, base)
        } else {
            opt_index_u64(self.wal.latest_index())
        };

        HeartbeatResponse {
            success,
            term: self.local_state.current_term().as_u64(),
            match_index,
            lease_round: request.lease_round,
        }
    }

    fn try_append_entries(&mut self, request: &HeartbeatRequest) -> Result<bool, io::Error> {
        if !self.accept_leader(Term::new(request.term), request.leader)? {
            return Ok(false);
        }

        // Reply false if log doesn’t contain an entry at prevLogIndex whose term matches
        // prevLogTerm (§5.3). Anything at or below our snapshot is committed, hence matches.
        if let Some(prev_index) = Index::from_u64(request.prev_log_index) {
            let covered_by_snapshot = matches!(self.wal.snapshot_base(), Some((_, base)) if prev_index <= base);
            if !covered_by_snapshot {
                match self.wal.read_term(prev_index)? {
                    Some(term) if term.as_u64() == request.prev_log_term => {}
                    _ => {
                        slog::debug!(self.logger, "Log mismatch at {:?}", prev_index);
                        return Ok(false);
                    }
                }
            }
        }

        let base = self.wal.snapshot_base().map(|(_, index)| index);
        let mut index = Index::new(request.prev_log_index + 1);
        for wire_entry in &request.entries {
            let entry_index = index;
            index = index.plus(1);
            if matches!(base, Some(base) if entry_index <= base) {
                continue;
            }

            let term = Term::new(wire_entry.term);
            // If an existing entry conflicts with a new one (same index but different terms),
            // delete the existing entry and all that follow it (§5.3)
            match self.wal.read_term(entry_index)? {
                Some(existing) if existing == term => continue,
                Some(_) => {
                    slog::info!(self.logger, "Truncating conflicting suffix from {:?}", entry_index);
                    self.wal.truncate(entry_index)?;
                }
                None => {}
            }

            let payload = EntryPayload::decode_exact(&wire_entry.payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let appended = self.wal.append(RaftLogEntry { term, payload })?;
            if appended != entry_index {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("appended {:?} at {:?}, expected {:?}", wire_entry, appended, entry_index),
                ));
            }
        }

        // If leaderCommit > commitIndex, set commitIndex =
        // min(leaderCommit, index of last new entry)
        let last_new = request.prev_log_index + request.entries.len() as u64;
        if let Some(new_commit) = Index::from_u64(std::cmp::min(request.leader_commit, last_new)) {
            if self.wal.ratchet_fwd_commit_index_if_changed(new_commit) {
                self.apply_committed_entries();
            }
        }

        Ok(true)
    }

    /// Fold in a request from a leader of `term`. Returns false for a stale leader.
    pub(super) fn accept_leader(&mut self, term: Term, leader: ActorId) -> Result<bool, io::Error> {
        let current_term = self.local_state.current_term();
        if term < current_term {
            slog::debug!(self.logger, "Rejecting {:?} of stale term {:?}", leader, term);
            return Ok(false);
        }

        if term > current_term {
            self.observe_term(term, Some(leader))?;
        } else {
            match self.election_state.role() {
                ReplicaRole::Leader => {
                    slog::warn!(self.logger, "{:?} claims leadership of our own term {:?}", leader, term);
                    return Ok(false);
                }
                ReplicaRole::Candidate | ReplicaRole::PreCandidate => self.become_follower(term, Some(leader)),
                ReplicaRole::Follower => self.election_state.set_leader_if_unknown(leader),
            }
        }

        self.election_state.reset_timeout_if_follower();
        self.election_state.record_leader_contact(Instant::now());
        Ok(true)
    }

    pub(super) fn handle_heartbeat_response(&mut self, from: ActorId, response: HeartbeatResponse) {
        if !self.accept_peer_response(from, response.term, response.lease_round) {
            return;
        }

        if let Some(peer_state) = self.peer_state_mut(&from) {
            if response.success {
                peer_state.record_success(Index::from_u64(response.match_index));
            } else {
                peer_state.record_mismatch(Index::from_u64(response.match_index));
            }
        }
        self.advance_commit_index();
    }

    /// Term and round checks shared by every leader side reply. Returns true if the reply should
    /// be folded into the peer's state.
    pub(super) fn accept_peer_response(&mut self, from: ActorId, term: u64, lease_round: u64) -> bool {
        let term = Term::new(term);
        match self.observe_term(term, None) {
            Ok(true) => return false,
            Ok(false) => {}
            Err(e) => {
                slog::error!(self.logger, "Failed to persist observed term: {:?}", e);
                return false;
            }
        }
        if term < self.local_state.current_term() {
            return false;
        }

        let leader_state = match self.election_state.leader_state_mut() {
            Some(leader_state) => leader_state,
            None => return false,
        };
        let current_round = leader_state.lease.current_round();
        match leader_state.tracker.peer_state_mut(&from) {
            Some(peer_state) => peer_state.ratchet_fwd_received_round(lease_round, current_round),
            None => false,
        }
    }

    pub(super) fn peer_state_mut(&mut self, peer_id: &ActorId) -> Option<&mut PeerState> {
        self.election_state
            .leader_state_mut()
            .and_then(|leader_state| leader_state.tracker.peer_state_mut(peer_id))
    }

    /// Leader side: move the commit index to the highest index stored on a majority.
    pub(super) fn advance_commit_index(&mut self) {
        let leader_state = match self.election_state.leader_state() {
            Some(leader_state) => leader_state,
            None => return,
        };
        let peers_matched: Vec<Option<Index>> = leader_state.tracker.peers_iter().map(PeerState::matched).collect();
        let tentative = if peers_matched.is_empty() {
            self.wal.latest_index()
        } else {
            get_cluster_commit_index(peers_matched)
        };
        let tentative = match tentative {
            Some(tentative) => tentative,
            None => return,
        };

        let current_term = self.local_state.current_term();
        match self.wal.ratchet_fwd_commit_index_if_valid(tentative, current_term) {
            Ok(true) => {
                slog::debug!(self.logger, "Commit index is now {:?}", tentative);
                self.apply_committed_entries();
            }
            Ok(false) => {}
            Err(e) => slog::error!(self.logger, "Failed to advance commit index: {:?}", e),
        }
    }
}

/// Build the next request to `peer_state`'s peer: a snapshot chunk while the peer is behind our
/// first log entry, log entries from its cursor otherwise.
pub(super) fn new_peer_request<L>(
    current_term: Term,
    my_id: ActorId,
    lease_round: u64,
    peer_state: &mut PeerState,
    wal: &WriteAheadLog<L>,
    snapshots: &dyn SnapshotStore,
    options: &ReplicaOptions,
) -> Result<RaftMessage, PeerRequestError>
where
    L: Log<RaftLogEntry>,
{
    let (next_index, opt_previous_index) = peer_state.next_and_previous_log_index();

    if !peer_state.is_receiving_snapshot() && next_index < wal.first_index() {
        let (metadata, data) = snapshots
            .latest()
            .map_err(PeerRequestError::SnapshotRead)?
            .ok_or(PeerRequestError::NoSnapshot)?;
        peer_state.start_snapshot(SnapshotCursor::new(metadata, data));
    }

    if let Some(cursor) = peer_state.snapshot_cursor_mut() {
        let chunk = cursor.next_chunk(lease_round, options.snapshot_chunk_size);
        return Ok(RaftMessage::SnapshotRequest(SnapshotRequest {
            term: current_term.as_u64(),
            leader: my_id,
            offset: chunk.offset,
            last: chunk.last,
            metadata: cursor.metadata().clone(),
            data: chunk.data,
            lease_round,
        }));
    }

    let previous_log_term = match opt_previous_index {
        None => 0,
        Some(previous_index) => match wal.read_term(previous_index) {
            Ok(Some(term)) => term.as_u64(),
            Ok(None) => return Err(PeerRequestError::MissingLogEntry(previous_index)),
            Err(e) => return Err(PeerRequestError::DiskRead(previous_index, e)),
        },
    };

    let entries = wal
        .read_from(next_index, options.max_entries_per_request)
        .map_err(|e| PeerRequestError::DiskRead(next_index, e))?
        .into_iter()
        .map(|entry| WireEntry {
            term: entry.term.as_u64(),
            payload: entry.payload.encode_to_bytes(),
        })
        .collect();

    Ok(RaftMessage::HeartbeatRequest(HeartbeatRequest {
        term: current_term.as_u64(),
        leader: my_id,
        prev_log_index: opt_index_u64(opt_previous_index),
        prev_log_term: previous_log_term,
        entries,
        leader_commit: opt_index_u64(wal.commit_index()),
        lease_round,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::InMemoryLog;
    use crate::mail::SnapshotMetadata;
    use crate::peers::ConsensusPeersConfiguration;
    use crate::replica::election::LeaderStateTracker;
    use crate::replica::snapshot::InMemorySnapshotStore;
    use crate::replica::write_ahead_log;
    use bytes::Bytes;
    use std::collections::BTreeSet;
    use tokio::time::Duration;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn options() -> ReplicaOptions {
        ReplicaOptions {
            lease_duration: Duration::from_millis(100),
            reply_timeout: Duration::from_millis(100),
            snapshot_chunk_size: 4,
            max_entries_per_request: 2,
            follower_min_timeout: Duration::from_millis(150),
        }
    }

    fn peer() -> ActorId {
        ActorId::from(2u64)
    }

    fn tracker_for(latest: Option<Index>) -> LeaderStateTracker {
        let peers: BTreeSet<ActorId> = vec![peer()].into_iter().collect();
        LeaderStateTracker::new(&peers, latest)
    }

    fn wal_with(terms: &[u64]) -> WriteAheadLog<InMemoryLog<RaftLogEntry>> {
        let (wal, _stream) =
            write_ahead_log::wired(test_logger(), InMemoryLog::create().unwrap(), None, None).unwrap();
        let mut wal = wal;
        for (i, term) in terms.iter().enumerate() {
            wal.append(RaftLogEntry {
                term: Term::new(*term),
                payload: EntryPayload::Data(Bytes::from(format!("e{}", i + 1))),
            })
            .unwrap();
        }
        wal
    }

    #[test]
    fn requests_carry_entries_from_the_peer_cursor() {
        let wal = wal_with(&[1, 1, 2]);
        let mut tracker = tracker_for(Some(Index::new(1)));
        let peer_state = tracker.peer_state_mut(&peer()).unwrap();
        let snapshots = InMemorySnapshotStore::new();

        let message = new_peer_request(Term::new(2), ActorId::from(1u64), 7, peer_state, &wal, &snapshots, &options())
            .unwrap();

        match message {
            RaftMessage::HeartbeatRequest(request) => {
                assert_eq!(request.prev_log_index, 1);
                assert_eq!(request.prev_log_term, 1);
                assert_eq!(request.lease_round, 7);
                // Capped by max_entries_per_request.
                assert_eq!(request.entries.len(), 2);
                assert_eq!(request.entries[1].term, 2);
                assert_eq!(
                    EntryPayload::decode_exact(&request.entries[0].payload).unwrap(),
                    EntryPayload::Data(Bytes::from("e2"))
                );
            }
            other => panic!("expected a heartbeat, got {:?}", other),
        }
    }

    #[test]
    fn peers_behind_the_log_start_receive_snapshot_chunks() {
        let mut wal = wal_with(&[1, 1, 1, 1]);
        wal.ratchet_fwd_commit_index_if_changed(Index::new(3));
        wal.apply_all_committed_entries().unwrap();
        wal.compact_until(Index::new(3)).unwrap();

        let mut snapshots = InMemorySnapshotStore::new();
        snapshots.set_state(Bytes::from("abcdef"));
        let metadata = SnapshotMetadata {
            last_index: 3,
            last_term: 1,
            peers: ConsensusPeersConfiguration::initial(vec![ActorId::from(1u64), peer()]),
        };
        snapshots.create(&metadata).unwrap();

        let mut tracker = tracker_for(None);
        let peer_state = tracker.peer_state_mut(&peer()).unwrap();

        let first = new_peer_request(Term::new(1), ActorId::from(1u64), 1, peer_state, &wal, &snapshots, &options())
            .unwrap();
        match first {
            RaftMessage::SnapshotRequest(request) => {
                assert_eq!(request.offset, 0);
                assert!(!request.last);
                assert_eq!(request.data, Bytes::from("abcd"));
                assert_eq!(request.metadata, metadata);
            }
            other => panic!("expected a snapshot chunk, got {:?}", other),
        }

        // Unacknowledged chunks are resent.
        let again = new_peer_request(Term::new(1), ActorId::from(1u64), 2, peer_state, &wal, &snapshots, &options())
            .unwrap();
        assert!(matches!(again, RaftMessage::SnapshotRequest(request) if request.offset == 0));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let mut wal = wal_with(&[1, 1]);
        wal.ratchet_fwd_commit_index_if_changed(Index::new(2));
        wal.apply_all_committed_entries().unwrap();
        wal.compact_until(Index::new(2)).unwrap();

        let mut tracker = tracker_for(None);
        let peer_state = tracker.peer_state_mut(&peer()).unwrap();

        let result = new_peer_request(
            Term::new(1),
            ActorId::from(1u64),
            1,
            peer_state,
            &wal,
            &InMemorySnapshotStore::new(),
            &options(),
        );
        assert!(matches!(result, Err(PeerRequestError::NoSnapshot)));
    }
}
