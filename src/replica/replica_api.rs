use crate::commitlog::Index;
use crate::peers::{ActorId, ConsensusPeersConfiguration, PeerQuorum};
use crate::replica::Term;
use bytes::Bytes;
use std::fmt;
use std::io;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct WriteLogsInput {
    pub(crate) batch: Vec<Bytes>,
}

#[derive(Debug, Clone)]
pub(crate) struct WriteLogsOutput {
    pub(crate) term: Term,
    pub(crate) first_index: Index,
    pub(crate) last_index: Index,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WriteLogsError {
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    #[error("Refusing to write an empty batch")]
    EmptyBatch,

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    // The batch was appended but leadership was lost before it committed. It may or may not
    // commit under the next leader.
    #[error("Leadership was lost before the batch committed")]
    Superseded,

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

/// Outcome of a membership change step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsensusChangeResult {
    Success,
    Invalid,
    Conflict,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum PeersChangeError {
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    #[error("Leadership was lost before the change was applied")]
    Superseded,

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

/// A membership transform. Given the active quorum of remote voters, return the new one, or
/// `None` to reject the change.
pub type PeersTransform = Box<dyn FnOnce(&PeerQuorum) -> Option<PeerQuorum> + Send>;

pub(crate) struct ConfiguratePeersInput {
    pub(crate) transform: PeersTransform,
}

impl fmt::Debug for ConfiguratePeersInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfiguratePeersInput")
    }
}

#[derive(Debug)]
pub(crate) struct LeaseReadOutput {
    pub(crate) term: Term,
    pub(crate) commit_index: Option<Index>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum LeaseReadError {
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    #[error("Leader lease has expired")]
    LeaseExpired,

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum DropLogsError {
    #[error("Can't drop logs up to {requested:?}, last applied is {applied:?}")]
    NotApplied {
        requested: Index,
        applied: Option<Index>,
    },

    #[error("Failed to build or persist snapshot: {0}")]
    LocalIoError(io::Error),

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ReplicaRole {
    Follower,
    PreCandidate,
    Candidate,
    Leader,
}

/// Point-in-time view of the replica, answered by the actor.
#[derive(Debug, Clone)]
pub(crate) struct ReplicaStatus {
    pub(crate) role: ReplicaRole,
    pub(crate) term: Term,
    pub(crate) leader: Option<ActorId>,
    pub(crate) commit_index: Option<Index>,
    pub(crate) last_applied_index: Option<Index>,
    pub(crate) peers: ConsensusPeersConfiguration,
}

/// LeaderTimerTick is a single tick of a leader's heartbeat timer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LeaderTimerTick {
    pub(crate) term: Term,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RoundKind {
    Prevote,
    Vote,
    Heartbeat,
}

/// QuorumDecided reports the decision of a broadcast round. Replies to the round have already
/// been delivered to the actor by the time this arrives.
#[derive(Debug, Clone)]
pub(crate) struct QuorumDecided {
    pub(crate) kind: RoundKind,
    pub(crate) term: Term,
    pub(crate) round: u64,
    pub(crate) started_at: Instant,
    pub(crate) granted: bool,
}
