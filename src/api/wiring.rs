use crate::actor::{ActorClient, ReplicaActor};
use crate::api::commit_stream::RaftCommitStream;
use crate::api::consensus::RaftConsensusHandle;
use crate::api::listener::ConsensusListener;
use crate::api::options::{RaftOptions, RaftOptionsValidated};
use crate::commitlog::Log;
use crate::peers::{ActorId, RemoteActorFactory};
use crate::replica::{self, LoadStateError, RaftLogEntry, SnapshotStore, StatusMap};
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;

pub struct RaftConfig<L> {
    pub my_id: ActorId,
    // Members of the cluster the first time it boots. Ignored once a membership was persisted.
    // May or may not list `my_id`.
    pub initial_members: Vec<ActorId>,
    pub log: L,
    pub status_map: Box<dyn StatusMap>,
    pub snapshot_store: Box<dyn SnapshotStore>,
    pub remote_factory: Arc<dyn RemoteActorFactory>,
    pub info_logger: slog::Logger,
    pub options: RaftOptions,
}

/// The three faces of a running replica.
pub struct RaftConsensus {
    pub handle: RaftConsensusHandle,
    pub listener: ConsensusListener,
    pub commit_stream: RaftCommitStream,
}

#[derive(Debug, thiserror::Error)]
pub enum RaftCreationError {
    #[error("Illegal options for configuring consensus: {0}")]
    IllegalOptions(String),
    #[error("Persisted state is unusable")]
    CorruptedState(LoadStateError),
    #[error("Log initialization failure")]
    LogInitialization(io::Error),
}

/// Recover the replica from `config.log` and `config.status_map` and start it on the current
/// tokio runtime. The replica starts as a follower and runs until every handle is dropped.
pub async fn try_create_raft_consensus<L>(config: RaftConfig<L>) -> Result<RaftConsensus, RaftCreationError>
where
    L: Log<RaftLogEntry> + 'static,
{
    let root_logger = config
        .info_logger
        .new(slog::o!("ActorId" => format!("{:?}", config.my_id)));

    let options = RaftOptionsValidated::try_from(config.options)
        .map_err(|e| RaftCreationError::IllegalOptions(e.to_string()))?;

    let (actor_client, actor_queue_rx) = ActorClient::new(options.actor_queue_size);

    let parts = replica::ReplicaParts {
        my_id: config.my_id,
        initial_members: config.initial_members,
        log: config.log,
        status_map: config.status_map,
        snapshots: config.snapshot_store,
        remote_factory: config.remote_factory,
    };
    let (replica, replica_commit_stream, state_listener) = replica::create_replica(
        root_logger.clone(),
        parts,
        actor_client.weak(),
        options.election_config(config.my_id),
        options.replica_options(),
    )?;

    let replica_actor = ReplicaActor::new(root_logger, actor_queue_rx, replica);
    tokio::spawn(replica_actor.run_event_loop());

    Ok(RaftConsensus {
        handle: RaftConsensusHandle::new(actor_client),
        listener: ConsensusListener::new(state_listener),
        commit_stream: RaftCommitStream::new(replica_commit_stream),
    })
}

impl From<replica::ReplicaCreationError> for RaftCreationError {
    fn from(e: replica::ReplicaCreationError) -> Self {
        match e {
            replica::ReplicaCreationError::CorruptedState(e) => RaftCreationError::CorruptedState(e),
            replica::ReplicaCreationError::LogInitialization(e) => RaftCreationError::LogInitialization(e),
        }
    }
}
