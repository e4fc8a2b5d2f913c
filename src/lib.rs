mod actor;
mod api;
mod commitlog;
mod mail;
mod peers;
mod quorum;
mod replica;

pub use api::try_create_raft_consensus;
pub use api::Consensus;
pub use api::ConsensusExited;
pub use api::ConsensusListener;
pub use api::ConsensusState;
pub use api::DropLogsError;
pub use api::LeaseRead;
pub use api::LeaseReadError;
pub use api::LogBatch;
pub use api::MailReceiver;
pub use api::MembershipError;
pub use api::RaftCommitStream;
pub use api::RaftCommittedEntry;
pub use api::RaftConfig;
pub use api::RaftConsensus;
pub use api::RaftConsensusHandle;
pub use api::RaftCreationError;
pub use api::RaftOptions;
pub use api::RaftRole;
pub use api::RaftStatus;
pub use api::WriteError;
pub use api::WrittenLogs;
pub use commitlog::Entry;
pub use commitlog::InMemoryLog;
pub use commitlog::Index;
pub use commitlog::Log;
pub use mail::CorruptedDataError;
pub use mail::ExtractError;
pub use mail::HeartbeatRequest;
pub use mail::HeartbeatResponse;
pub use mail::Mail;
pub use mail::RaftMailBuilder;
pub use mail::RaftMailExtractor;
pub use mail::RaftMailType;
pub use mail::RaftMessage;
pub use mail::SnapshotMetadata;
pub use mail::SnapshotRequest;
pub use mail::SnapshotResponse;
pub use mail::VoteRequest;
pub use mail::VoteResponse;
pub use mail::WireEntry;
pub use peers::ActorId;
pub use peers::ConsensusPeersConfiguration;
pub use peers::PeerQuorum;
pub use peers::RemoteActor;
pub use peers::RemoteActorFactory;
pub use peers::TransportError;
pub use quorum::majority_of;
pub use quorum::propose;
pub use quorum::ProposeError;
pub use quorum::QuorumDecision;
pub use quorum::QuorumFinished;
pub use quorum::QuorumHandle;
pub use quorum::QuorumProposer;
pub use replica::ConsensusChangeResult;
pub use replica::EntryPayload;
pub use replica::InMemorySnapshotStore;
pub use replica::InMemoryStatusMap;
pub use replica::LoadStateError;
pub use replica::PeersTransform;
pub use replica::RaftLogEntry;
pub use replica::SnapshotStore;
pub use replica::StatusMap;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
