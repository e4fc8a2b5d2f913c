use crate::actor::ActorExited;
use crate::peers::ActorId;
use crate::replica;
use std::io;

/// The consensus task has exited, so nothing can be served anymore.
#[derive(Debug, thiserror::Error)]
#[error("Consensus task has exited")]
pub struct ConsensusExited;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    // Retry against `leader` if one is known. Otherwise an election is likely in progress; retry
    // with backoff.
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    #[error("Refusing to write an empty batch")]
    EmptyBatch,

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    // The batch may still commit under the next leader; the application has to find out.
    #[error("Leadership was lost before the batch committed")]
    Superseded,

    #[error("Consensus task has exited")]
    ConsensusExited,
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    #[error("Failed to persist log")]
    LocalIoError(io::Error),

    #[error("Leadership was lost before the change was applied")]
    Superseded,

    #[error("Consensus task has exited")]
    ConsensusExited,
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseReadError {
    #[error("I'm not leader")]
    NotLeader { leader: Option<ActorId> },

    // Leader, but no heartbeat round reached a majority recently. Fall back to a write.
    #[error("Leader lease has expired")]
    LeaseExpired,

    #[error("Consensus task has exited")]
    ConsensusExited,
}

#[derive(Debug, thiserror::Error)]
pub enum DropLogsError {
    #[error("Can't drop logs up to {requested}, last applied is {applied:?}")]
    NotApplied { requested: u64, applied: Option<u64> },

    #[error("Failed to build or persist snapshot: {0}")]
    LocalIoError(io::Error),

    #[error("Consensus task has exited")]
    ConsensusExited,
}

// ------- Conversions --------

impl From<ActorExited> for ConsensusExited {
    fn from(_: ActorExited) -> Self {
        ConsensusExited
    }
}

impl From<replica::WriteLogsError> for WriteError {
    fn from(internal_error: replica::WriteLogsError) -> Self {
        match internal_error {
            replica::WriteLogsError::NotLeader { leader } => WriteError::NotLeader { leader },
            replica::WriteLogsError::EmptyBatch => WriteError::EmptyBatch,
            replica::WriteLogsError::LocalIoError(e) => WriteError::LocalIoError(e),
            replica::WriteLogsError::Superseded => WriteError::Superseded,
            replica::WriteLogsError::ActorExited => WriteError::ConsensusExited,
        }
    }
}

impl From<replica::PeersChangeError> for MembershipError {
    fn from(internal_error: replica::PeersChangeError) -> Self {
        match internal_error {
            replica::PeersChangeError::NotLeader { leader } => MembershipError::NotLeader { leader },
            replica::PeersChangeError::LocalIoError(e) => MembershipError::LocalIoError(e),
            replica::PeersChangeError::Superseded => MembershipError::Superseded,
            replica::PeersChangeError::ActorExited => MembershipError::ConsensusExited,
        }
    }
}

impl From<replica::LeaseReadError> for LeaseReadError {
    fn from(internal_error: replica::LeaseReadError) -> Self {
        match internal_error {
            replica::LeaseReadError::NotLeader { leader } => LeaseReadError::NotLeader { leader },
            replica::LeaseReadError::LeaseExpired => LeaseReadError::LeaseExpired,
            replica::LeaseReadError::ActorExited => LeaseReadError::ConsensusExited,
        }
    }
}

impl From<replica::DropLogsError> for DropLogsError {
    fn from(internal_error: replica::DropLogsError) -> Self {
        match internal_error {
            replica::DropLogsError::NotApplied { requested, applied } => DropLogsError::NotApplied {
                requested: requested.as_u64(),
                applied: applied.map(|index| index.as_u64()),
            },
            replica::DropLogsError::LocalIoError(e) => DropLogsError::LocalIoError(e),
            replica::DropLogsError::ActorExited => DropLogsError::ConsensusExited,
        }
    }
}
