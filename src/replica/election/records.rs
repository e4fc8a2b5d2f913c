use crate::peers::ActorId;
use crate::quorum::majority_of;
use crate::replica::Term;
use std::collections::HashSet;
use tokio::time::{Duration, Instant};

/// ElectionRecord tallies one (pre)vote round. The local node's own vote is counted when the
/// record is created, so a single-node cluster has a majority immediately.
#[derive(Debug)]
pub(crate) struct ElectionRecord {
    term: Term,
    majority: usize,
    granted_by: HashSet<ActorId>,
    denied_by: HashSet<ActorId>,
}

impl ElectionRecord {
    pub(crate) fn new(term: Term, me: ActorId, num_voters: usize) -> Self {
        let mut granted_by = HashSet::with_capacity(num_voters);
        granted_by.insert(me);

        ElectionRecord {
            term,
            majority: majority_of(num_voters),
            granted_by,
            denied_by: HashSet::new(),
        }
    }

    pub(crate) fn term(&self) -> Term {
        self.term
    }

    /// Record a reply from `voter`. The first reply from a voter is the one that counts.
    pub(crate) fn record(&mut self, voter: ActorId, granted: bool) {
        if self.granted_by.contains(&voter) || self.denied_by.contains(&voter) {
            return;
        }
        if granted {
            self.granted_by.insert(voter);
        } else {
            self.denied_by.insert(voter);
        }
    }

    pub(crate) fn granted(&self) -> usize {
        self.granted_by.len()
    }

    pub(crate) fn denied(&self) -> usize {
        self.denied_by.len()
    }

    pub(crate) fn has_majority(&self) -> bool {
        self.granted() >= self.majority
    }

    pub(crate) fn majority(&self) -> usize {
        self.majority
    }
}

/// LeaseStatus is the leader's read lease. Every heartbeat round gets the next round number; a
/// round acknowledged by a majority extends the lease to the round's start plus the lease
/// duration.
#[derive(Debug)]
pub(crate) struct LeaseStatus {
    lease_round: u64,
    expiry: Option<Instant>,
}

impl LeaseStatus {
    pub(crate) fn new() -> Self {
        LeaseStatus {
            lease_round: 0,
            expiry: None,
        }
    }

    pub(crate) fn current_round(&self) -> u64 {
        self.lease_round
    }

    pub(crate) fn next_round(&mut self) -> u64 {
        self.lease_round += 1;
        self.lease_round
    }

    /// Rounds finish out of order; a late round never shortens the lease.
    pub(crate) fn extend(&mut self, round_started_at: Instant, lease_duration: Duration) {
        let new_expiry = round_started_at + lease_duration;
        if self.expiry.map(|expiry| new_expiry > expiry).unwrap_or(true) {
            self.expiry = Some(new_expiry);
        }
    }

    pub(crate) fn is_valid_at(&self, now: Instant) -> bool {
        matches!(self.expiry, Some(expiry) if now < expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> ActorId {
        ActorId::from(v)
    }

    #[test]
    fn self_vote_decides_single_node_cluster() {
        let record = ElectionRecord::new(Term::new(1), id(1), 1);
        assert!(record.has_majority());
    }

    #[test]
    fn majority_of_five_needs_three_distinct_voters() {
        let mut record = ElectionRecord::new(Term::new(4), id(1), 5);
        assert_eq!(record.majority(), 3);

        record.record(id(2), true);
        record.record(id(2), true);
        assert!(!record.has_majority());

        record.record(id(3), false);
        // A voter can't flip its reply.
        record.record(id(3), true);
        assert!(!record.has_majority());
        assert_eq!(record.denied(), 1);

        record.record(id(4), true);
        assert!(record.has_majority());
        assert_eq!(record.granted(), 3);
        assert_eq!(record.term(), Term::new(4));
    }

    #[test]
    fn lease_is_only_valid_after_a_decided_round() {
        let start = Instant::now();
        let duration = Duration::from_millis(100);
        let mut lease = LeaseStatus::new();
        assert!(!lease.is_valid_at(start));

        assert_eq!(lease.next_round(), 1);
        assert_eq!(lease.next_round(), 2);
        lease.extend(start + Duration::from_millis(50), duration);
        assert!(lease.is_valid_at(start + Duration::from_millis(149)));
        assert!(!lease.is_valid_at(start + Duration::from_millis(150)));

        // An older round finishing late doesn't pull the expiry back.
        lease.extend(start, duration);
        assert!(lease.is_valid_at(start + Duration::from_millis(120)));
        assert_eq!(lease.current_round(), 2);
    }
}
