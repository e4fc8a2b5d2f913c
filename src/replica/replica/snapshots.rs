use super::Replica;
use crate::commitlog::{Index, Log};
use crate::mail::{SnapshotMetadata, SnapshotRequest, SnapshotResponse};
use crate::peers::ActorId;
use crate::replica::snapshot::{ChunkOutcome, CursorProgress, SnapshotChunk};
use crate::replica::{DropLogsError, RaftLogEntry, Term};
use bytes::Bytes;
use std::io;

impl<L> Replica<L>
where
    L: Log<RaftLogEntry> + 'static,
{
    pub(super) fn handle_snapshot_request(&mut self, request: SnapshotRequest) -> SnapshotResponse {
        let (leader, lease_round) = (request.leader, request.lease_round);
        let status = match self.receive_snapshot_chunk(request) {
            Ok(status) => status,
            Err(e) => {
                slog::error!(self.logger, "Failed to install snapshot from {:?}: {:?}", leader, e);
                self.snapshot_receiver.abandon();
                false
            }
        };

        SnapshotResponse {
            status,
            term: self.local_state.current_term().as_u64(),
            peers_epoch: self.local_state.peers_configuration().epoch,
            lease_round,
        }
    }

    fn receive_snapshot_chunk(&mut self, request: SnapshotRequest) -> Result<bool, io::Error> {
        if !self.accept_leader(Term::new(request.term), request.leader)? {
            return Ok(false);
        }

        // Everything the snapshot covers is already committed here.
        if matches!(self.wal.commit_index(), Some(ci) if ci.as_u64() >= request.metadata.last_index) {
            self.snapshot_receiver.abandon();
            return Ok(true);
        }

        let chunk = SnapshotChunk {
            offset: request.offset,
            last: request.last,
            data: request.data,
        };
        match self.snapshot_receiver.receive(&request.metadata, chunk) {
            ChunkOutcome::Accepted | ChunkOutcome::Duplicate => Ok(true),
            ChunkOutcome::Rejected => {
                slog::info!(self.logger, "Rejected out of order snapshot chunk at {}", request.offset);
                Ok(false)
            }
            ChunkOutcome::Complete(metadata, data) => {
                self.install_snapshot(metadata, data)?;
                Ok(true)
            }
        }
    }

    /// Replace the log and applied state with a snapshot received from the leader.
    fn install_snapshot(&mut self, metadata: SnapshotMetadata, data: Bytes) -> Result<(), io::Error> {
        let last_index = Index::from_u64(metadata.last_index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "snapshot ends at index 0"))?;
        let last_term = Term::new(metadata.last_term);
        slog::info!(
            self.logger,
            "Installing snapshot through {:?} of term {:?}",
            last_index,
            last_term
        );

        self.snapshots.install(&metadata, data)?;
        self.wal.reset_to_snapshot(last_term, last_index);
        self.local_state.store_snapshot_metadata(metadata.clone())?;
        self.local_state.store_last_applied(last_index)?;
        self.local_state.store_peers_configuration(metadata.peers)?;

        self.membership.clear();
        self.install_quorum();
        Ok(())
    }

    pub(super) fn handle_snapshot_response(&mut self, from: ActorId, response: SnapshotResponse) {
        let lease_round = response.lease_round;
        if !self.accept_peer_response(from, response.term, lease_round) {
            return;
        }

        let peer_state = match self.peer_state_mut(&from) {
            Some(peer_state) => peer_state,
            None => return,
        };
        let (progress, last_index) = match peer_state.snapshot_cursor_mut() {
            Some(cursor) => (
                cursor.acknowledge(lease_round, response.status),
                cursor.metadata().last_index,
            ),
            None => return,
        };

        if progress == CursorProgress::Installed {
            if let Some(last_index) = Index::from_u64(last_index) {
                peer_state.finish_snapshot(last_index);
            }
            slog::info!(self.logger, "{:?} installed our snapshot through {}", from, last_index);
            self.advance_commit_index();
        }
    }

    /// Compact the log through `index`, recording a snapshot of the application state as of
    /// that index first. Compacting what is already compacted is a no-op.
    pub(crate) fn drop_logs_until(&mut self, index: Index) -> Result<(), DropLogsError> {
        let applied = self.wal.last_applied_index();
        if applied < Some(index) {
            return Err(DropLogsError::NotApplied {
                requested: index,
                applied,
            });
        }
        if matches!(self.wal.snapshot_base(), Some((_, base)) if index <= base) {
            return Ok(());
        }

        let term = self
            .wal
            .read_term(index)
            .map_err(DropLogsError::LocalIoError)?
            .ok_or_else(|| {
                DropLogsError::LocalIoError(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no entry at {:?}", index),
                ))
            })?;
        let metadata = SnapshotMetadata {
            last_index: index.as_u64(),
            last_term: term.as_u64(),
            peers: self.local_state.peers_configuration().clone(),
        };

        self.snapshots
            .create(&metadata)
            .map_err(DropLogsError::LocalIoError)?;
        self.local_state
            .store_snapshot_metadata(metadata)
            .map_err(DropLogsError::LocalIoError)?;
        self.wal.compact_until(index).map_err(DropLogsError::LocalIoError)?;

        slog::info!(self.logger, "Dropped logs through {:?}", index);
        Ok(())
    }
}
