use crate::commitlog::Index;
use crate::peers::ActorId;
use crate::replica::snapshot::SnapshotCursor;
use std::collections::{BTreeSet, HashMap};

pub(crate) struct LeaderStateTracker {
    peer_state: HashMap<ActorId, PeerState>,
    // Used to initialize cursors of peers that join mid-term.
    initial_next: Index,
}

impl LeaderStateTracker {
    pub(crate) fn new(peer_ids: &BTreeSet<ActorId>, previous_log_entry_index: Option<Index>) -> Self {
        let initial_next = previous_log_entry_index
            .map(|i| i.plus(1))
            .unwrap_or_else(Index::start_index);
        let peer_state = peer_ids
            .iter()
            .map(|peer_id| (*peer_id, PeerState::new(initial_next)))
            .collect();

        LeaderStateTracker {
            peer_state,
            initial_next,
        }
    }

    pub(crate) fn peer_state(&self, peer_id: &ActorId) -> Option<&PeerState> {
        self.peer_state.get(peer_id)
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ActorId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn peers_iter(&self) -> impl Iterator<Item = &PeerState> {
        self.peer_state.values()
    }

    /// Track exactly `peer_ids` after a membership change. Retained peers keep their cursors.
    pub(crate) fn sync_peers(&mut self, peer_ids: &BTreeSet<ActorId>) {
        self.peer_state.retain(|peer_id, _| peer_ids.contains(peer_id));
        for peer_id in peer_ids {
            let initial_next = self.initial_next;
            self.peer_state
                .entry(*peer_id)
                .or_insert_with(|| PeerState::new(initial_next));
        }
    }
}

pub(crate) struct PeerState {
    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Index,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: Option<Index>,

    // Lease rounds act as a logical clock for this peer. Replies carry the round of their request,
    // and a reply from an earlier round than one already handled is discarded.
    last_received_round: u64,

    // Present while this peer is being sent a snapshot instead of log entries.
    snapshot: Option<SnapshotCursor>,
}

impl PeerState {
    fn new(next: Index) -> Self {
        PeerState {
            next,
            matched: None,
            last_received_round: 0,
            snapshot: None,
        }
    }

    pub(crate) fn next_and_previous_log_index(&self) -> (Index, Option<Index>) {
        (self.next, self.next.checked_minus(1))
    }

    pub(crate) fn matched(&self) -> Option<Index> {
        self.matched
    }

    /// returns true if the reply is newer than every reply handled so far.
    pub(crate) fn ratchet_fwd_received_round(&mut self, round: u64, current_round: u64) -> bool {
        if self.last_received_round < round && round <= current_round {
            self.last_received_round = round;
            true
        } else {
            false
        }
    }

    /// The peer stores every entry up to `match_index`.
    pub(crate) fn record_success(&mut self, match_index: Option<Index>) {
        if let Some(new_matched) = match_index {
            if self.matched.map(|m| new_matched > m).unwrap_or(true) {
                self.matched = Some(new_matched);
            }
            if new_matched.plus(1) > self.next {
                self.next = new_matched.plus(1);
            }
        }
    }

    /// The peer's log didn't contain our `next - 1`. Back up, using the peer's last index as a hint
    /// to skip whole missing suffixes, but never below what the peer already matched.
    pub(crate) fn record_mismatch(&mut self, hint: Option<Index>) {
        let backed_up = self.next.checked_minus(1).unwrap_or_else(Index::start_index);
        let hinted = hint.map(|h| h.plus(1)).unwrap_or_else(Index::start_index);
        let floor = self.matched.map(|m| m.plus(1)).unwrap_or_else(Index::start_index);

        self.next = std::cmp::max(std::cmp::min(backed_up, hinted), floor);
    }

    pub(crate) fn snapshot_cursor_mut(&mut self) -> Option<&mut SnapshotCursor> {
        self.snapshot.as_mut()
    }

    pub(crate) fn is_receiving_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn start_snapshot(&mut self, cursor: SnapshotCursor) {
        self.snapshot = Some(cursor);
    }

    /// The peer installed a snapshot ending at `last_index`.
    pub(crate) fn finish_snapshot(&mut self, last_index: Index) {
        self.snapshot = None;
        self.record_success(Some(last_index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_at(next: u64) -> PeerState {
        PeerState::new(Index::new(next))
    }

    #[test]
    fn success_ratchets_forward_only() {
        let mut peer = peer_at(5);
        peer.record_success(Some(Index::new(7)));
        assert_eq!(peer.matched(), Some(Index::new(7)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(8));

        // A late reply for a shorter prefix doesn't move anything back.
        peer.record_success(Some(Index::new(6)));
        assert_eq!(peer.matched(), Some(Index::new(7)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(8));
    }

    #[test]
    fn mismatch_backs_up_to_the_hint() {
        let mut peer = peer_at(10);
        peer.record_mismatch(Some(Index::new(3)));
        assert_eq!(peer.next_and_previous_log_index(), (Index::new(4), Some(Index::new(3))));

        // Without a useful hint, back up by one.
        peer.record_mismatch(Some(Index::new(8)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(3));

        peer.record_mismatch(None);
        assert_eq!(peer.next_and_previous_log_index(), (Index::new(1), None));
        peer.record_mismatch(None);
        assert_eq!(peer.next_and_previous_log_index(), (Index::new(1), None));
    }

    #[test]
    fn mismatch_never_drops_below_matched() {
        let mut peer = peer_at(1);
        peer.record_success(Some(Index::new(4)));
        peer.record_mismatch(Some(Index::new(1)));
        assert_eq!(peer.next_and_previous_log_index().0, Index::new(5));
    }

    #[test]
    fn stale_rounds_are_discarded() {
        let mut peer = peer_at(1);
        assert!(peer.ratchet_fwd_received_round(2, 3));
        assert!(!peer.ratchet_fwd_received_round(1, 3));
        assert!(!peer.ratchet_fwd_received_round(2, 3));
        // Never ahead of what we've sent.
        assert!(!peer.ratchet_fwd_received_round(4, 3));
        assert!(peer.ratchet_fwd_received_round(3, 3));
    }

    #[test]
    fn sync_peers_keeps_cursors_of_retained_peers() {
        let ids = |v: &[u64]| v.iter().map(|i| ActorId::from(*i)).collect::<BTreeSet<_>>();
        let mut tracker = LeaderStateTracker::new(&ids(&[2, 3]), Some(Index::new(4)));
        tracker
            .peer_state_mut(&ActorId::from(2u64))
            .unwrap()
            .record_success(Some(Index::new(4)));

        tracker.sync_peers(&ids(&[2, 4]));

        assert!(tracker.peer_state(&ActorId::from(3u64)).is_none());
        assert_eq!(
            tracker.peer_state(&ActorId::from(2u64)).unwrap().matched(),
            Some(Index::new(4))
        );
        let joined = tracker.peer_state(&ActorId::from(4u64)).unwrap();
        assert_eq!(joined.matched(), None);
        assert_eq!(joined.next_and_previous_log_index().0, Index::new(5));
    }
}
