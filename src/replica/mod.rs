mod consensus_listener;
mod election;
mod local_state;
mod membership;
mod replica;
mod replica_api;
mod replica_wiring;
mod snapshot;
mod status_map;
mod write_ahead_log;

pub use local_state::LoadStateError;
pub use replica_api::ConsensusChangeResult;
pub use replica_api::PeersTransform;
pub use snapshot::InMemorySnapshotStore;
pub use snapshot::SnapshotStore;
pub use status_map::InMemoryStatusMap;
pub use status_map::StatusMap;
pub use write_ahead_log::EntryPayload;
pub use write_ahead_log::RaftLogEntry;

pub(crate) use consensus_listener::ConsensusSnapshot;
pub(crate) use consensus_listener::ConsensusStateListener;
pub(crate) use election::ElectionConfig;
pub(crate) use local_state::PersistentLocalState;
pub(crate) use local_state::Term;
pub(crate) use replica::Replica;
pub(crate) use replica::ReplicaOptions;
pub(crate) use replica_api::ConfiguratePeersInput;
pub(crate) use replica_api::DropLogsError;
pub(crate) use replica_api::LeaderTimerTick;
pub(crate) use replica_api::LeaseReadError;
pub(crate) use replica_api::LeaseReadOutput;
pub(crate) use replica_api::PeersChangeError;
pub(crate) use replica_api::QuorumDecided;
pub(crate) use replica_api::ReplicaRole;
pub(crate) use replica_api::ReplicaStatus;
pub(crate) use replica_api::RoundKind;
pub(crate) use replica_api::WriteLogsError;
pub(crate) use replica_api::WriteLogsInput;
pub(crate) use replica_api::WriteLogsOutput;
pub(crate) use replica_wiring::create_replica;
pub(crate) use replica_wiring::ReplicaCreationError;
pub(crate) use replica_wiring::ReplicaParts;
pub(crate) use write_ahead_log::CommitStream;
pub(crate) use write_ahead_log::CommittedEntry;
