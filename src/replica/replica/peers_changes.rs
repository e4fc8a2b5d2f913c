use super::Replica;
use crate::actor::Callback;
use crate::commitlog::Log;
use crate::replica::write_ahead_log::EntryPayload;
use crate::replica::{ConfiguratePeersInput, ConsensusChangeResult, PeersChangeError, RaftLogEntry};

type PeersCallback = Callback<ConsensusChangeResult, PeersChangeError>;

// Membership moves through log entries: a lock, then either a new configuration or an unlock.
// Each step resolves its callback once its entry applies on the leader.
impl<L> Replica<L>
where
    L: Log<RaftLogEntry> + 'static,
{
    pub(crate) fn prepare_peers_changes(&mut self, callback: PeersCallback) {
        if !self.election_state.is_leader() {
            return callback.send(Err(self.peers_change_not_leader()));
        }

        match self.membership.check_prepare(self.local_state.peers_configuration()) {
            Ok(payload) => self.append_membership_entry(payload, callback),
            Err(result) => callback.send(Ok(result)),
        }
    }

    pub(crate) fn configurate_peers(&mut self, input: ConfiguratePeersInput, callback: PeersCallback) {
        if !self.election_state.is_leader() {
            return callback.send(Err(self.peers_change_not_leader()));
        }

        let new_quorum = (input.transform)(&*self.quorum);
        let checked = self.membership.check_configure(
            self.local_state.peers_configuration(),
            &self.my_id,
            new_quorum.as_ref(),
        );
        match checked {
            Ok(config) => {
                if let Some(new_quorum) = new_quorum {
                    self.membership.remember_quorum(new_quorum);
                }
                self.append_membership_entry(EntryPayload::ConfigurePeers(config), callback);
            }
            Err(result) => callback.send(Ok(result)),
        }
    }

    pub(crate) fn abort_peers_changes(&mut self, callback: PeersCallback) {
        if !self.election_state.is_leader() {
            return callback.send(Err(self.peers_change_not_leader()));
        }

        match self.membership.check_abort(self.local_state.peers_configuration()) {
            Ok(payload) => self.append_membership_entry(payload, callback),
            Err(result) => callback.send(Ok(result)),
        }
    }

    fn peers_change_not_leader(&self) -> PeersChangeError {
        PeersChangeError::NotLeader {
            leader: self.election_state.leader(),
        }
    }

    fn append_membership_entry(&mut self, payload: EntryPayload, callback: PeersCallback) {
        let term = self.local_state.current_term();
        let entry = RaftLogEntry {
            term,
            payload: payload.clone(),
        };
        match self.wal.append(entry) {
            Ok(index) => {
                slog::info!(self.logger, "Proposed membership entry {:?} at {:?}", payload, index);
                self.membership.set_pending(index, payload);
                self.pending_peer_changes.insert(index, callback);
                self.start_heartbeat_round();
            }
            Err(e) => {
                slog::error!(self.logger, "Failed to append membership entry: {:?}", e);
                self.membership.take_quorum();
                callback.send(Err(PeersChangeError::LocalIoError(e)));
            }
        }
    }
}
