use crate::commitlog::Index;
use crate::peers::{ActorId, ConsensusPeersConfiguration};
use crate::replica;
use bytes::Bytes;

/// A batch of application entries, appended contiguously by the leader.
#[derive(Debug, Clone, Default)]
pub struct LogBatch {
    pub entries: Vec<Bytes>,
}

impl LogBatch {
    pub fn single(entry: Bytes) -> Self {
        LogBatch { entries: vec![entry] }
    }
}

/// Where a written batch landed. It is committed by the time this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenLogs {
    pub term: u64,
    pub first_index: u64,
    pub last_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    PreCandidate,
    Candidate,
    Leader,
}

/// A read served under the leader's lease. Every entry up to `commit_index` is committed and no
/// other leader can exist until the lease expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseRead {
    pub term: u64,
    pub commit_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftStatus {
    pub role: RaftRole,
    pub term: u64,
    pub leader: Option<ActorId>,
    pub commit_index: Option<u64>,
    pub last_applied_index: Option<u64>,
    pub peers: ConsensusPeersConfiguration,
}

impl RaftStatus {
    pub fn epoch(&self) -> u64 {
        self.peers.epoch
    }
}

/// What a `ConsensusListener` observes. Only changes are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusState {
    pub role: RaftRole,
    pub term: u64,
    pub leader: Option<ActorId>,
    pub commit_index: Option<u64>,
    pub epoch: u64,
}

fn opt_u64(index: Option<Index>) -> Option<u64> {
    index.map(|i| i.as_u64())
}

// ------- Conversions --------

impl From<replica::WriteLogsOutput> for WrittenLogs {
    fn from(output: replica::WriteLogsOutput) -> Self {
        WrittenLogs {
            term: output.term.as_u64(),
            first_index: output.first_index.as_u64(),
            last_index: output.last_index.as_u64(),
        }
    }
}

impl From<replica::ReplicaRole> for RaftRole {
    fn from(role: replica::ReplicaRole) -> Self {
        match role {
            replica::ReplicaRole::Follower => RaftRole::Follower,
            replica::ReplicaRole::PreCandidate => RaftRole::PreCandidate,
            replica::ReplicaRole::Candidate => RaftRole::Candidate,
            replica::ReplicaRole::Leader => RaftRole::Leader,
        }
    }
}

impl From<replica::LeaseReadOutput> for LeaseRead {
    fn from(output: replica::LeaseReadOutput) -> Self {
        LeaseRead {
            term: output.term.as_u64(),
            commit_index: opt_u64(output.commit_index),
        }
    }
}

impl From<replica::ReplicaStatus> for RaftStatus {
    fn from(status: replica::ReplicaStatus) -> Self {
        RaftStatus {
            role: RaftRole::from(status.role),
            term: status.term.as_u64(),
            leader: status.leader,
            commit_index: opt_u64(status.commit_index),
            last_applied_index: opt_u64(status.last_applied_index),
            peers: status.peers,
        }
    }
}

impl From<replica::ConsensusSnapshot> for ConsensusState {
    fn from(snapshot: replica::ConsensusSnapshot) -> Self {
        ConsensusState {
            role: RaftRole::from(snapshot.role),
            term: snapshot.term.as_u64(),
            leader: snapshot.leader,
            commit_index: opt_u64(snapshot.commit_index),
            epoch: snapshot.epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::Term;

    #[test]
    fn status_conversion_keeps_unset_indexes_unset() {
        let status = replica::ReplicaStatus {
            role: replica::ReplicaRole::Candidate,
            term: Term::new(4),
            leader: None,
            commit_index: None,
            last_applied_index: Index::from_u64(2),
            peers: ConsensusPeersConfiguration::initial(vec![ActorId::from(1u64)]),
        };

        let converted = RaftStatus::from(status);

        assert_eq!(converted.role, RaftRole::Candidate);
        assert_eq!(converted.term, 4);
        assert_eq!(converted.commit_index, None);
        assert_eq!(converted.last_applied_index, Some(2));
        assert_eq!(converted.epoch(), 0);
    }
}
