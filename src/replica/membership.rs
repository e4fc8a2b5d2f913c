use crate::commitlog::Index;
use crate::peers::{ActorId, ConsensusPeersConfiguration, PeerQuorum};
use crate::replica::write_ahead_log::EntryPayload;
use crate::replica::ConsensusChangeResult;
use std::collections::BTreeSet;

/// MembershipTracker is the leader's view of the one membership change that may be in flight:
/// a lock, configure or unlock entry that is in the log but not applied yet. Only one such entry
/// may exist at a time, so membership entries apply in the order they were proposed.
#[derive(Debug, Default)]
pub(crate) struct MembershipTracker {
    pending: Option<(Index, EntryPayload)>,
    // Remotes handed back by the configurate transform, reused when the entry applies.
    proposed_quorum: Option<PeerQuorum>,
}

impl MembershipTracker {
    pub(crate) fn pending(&self) -> Option<&(Index, EntryPayload)> {
        self.pending.as_ref()
    }

    pub(crate) fn set_pending(&mut self, index: Index, payload: EntryPayload) {
        self.pending = Some((index, payload));
    }

    /// Forget the pending change once the log has applied it.
    pub(crate) fn applied_through(&mut self, applied: Index) {
        if matches!(self.pending, Some((index, _)) if index <= applied) {
            self.pending = None;
        }
    }

    pub(crate) fn remember_quorum(&mut self, quorum: PeerQuorum) {
        self.proposed_quorum = Some(quorum);
    }

    pub(crate) fn take_quorum(&mut self) -> Option<PeerQuorum> {
        self.proposed_quorum.take()
    }

    pub(crate) fn clear(&mut self) {
        self.pending = None;
        self.proposed_quorum = None;
    }

    pub(crate) fn check_prepare(&self, active: &ConsensusPeersConfiguration) -> Result<EntryPayload, ConsensusChangeResult> {
        if active.locked || self.pending.is_some() {
            return Err(ConsensusChangeResult::Conflict);
        }
        Ok(EntryPayload::LockPeers)
    }

    /// Validate `new_quorum` (the transform's output) against the active configuration and build
    /// the configuration to append.
    pub(crate) fn check_configure(
        &self,
        active: &ConsensusPeersConfiguration,
        me: &ActorId,
        new_quorum: Option<&PeerQuorum>,
    ) -> Result<ConsensusPeersConfiguration, ConsensusChangeResult> {
        if !active.locked || self.pending.is_some() {
            return Err(ConsensusChangeResult::Conflict);
        }

        let new_remotes = match new_quorum {
            Some(quorum) => quorum.ids(),
            None => return Err(ConsensusChangeResult::Invalid),
        };
        if new_remotes.contains(me) || new_remotes == active.remote_members(me) {
            return Err(ConsensusChangeResult::Invalid);
        }

        let mut members: BTreeSet<ActorId> = new_remotes;
        members.insert(*me);
        Ok(active.next_epoch(members))
    }

    pub(crate) fn check_abort(&self, active: &ConsensusPeersConfiguration) -> Result<EntryPayload, ConsensusChangeResult> {
        if !active.locked || self.pending.is_some() {
            return Err(ConsensusChangeResult::Conflict);
        }
        Ok(EntryPayload::UnlockPeers)
    }
}

/// The configuration after applying a membership entry, or `None` for entries that don't touch
/// membership.
pub(crate) fn apply_to(active: &ConsensusPeersConfiguration, payload: &EntryPayload) -> Option<ConsensusPeersConfiguration> {
    match payload {
        EntryPayload::LockPeers => Some(active.with_locked(true)),
        EntryPayload::UnlockPeers => Some(active.with_locked(false)),
        EntryPayload::ConfigurePeers(config) => Some(config.clone()),
        EntryPayload::Data(_) | EntryPayload::Noop => None,
    }
}
