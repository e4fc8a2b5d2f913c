//! This mod is meant to hold most of the code for the library's client-facing API.
mod commit_stream;
mod consensus;
mod errors;
mod listener;
mod options;
mod types;
mod wiring;

pub use commit_stream::RaftCommitStream;
pub use commit_stream::RaftCommittedEntry;
pub use consensus::Consensus;
pub use consensus::MailReceiver;
pub use consensus::RaftConsensusHandle;
pub use errors::ConsensusExited;
pub use errors::DropLogsError;
pub use errors::LeaseReadError;
pub use errors::MembershipError;
pub use errors::WriteError;
pub use listener::ConsensusListener;
pub use options::RaftOptions;
pub use types::ConsensusState;
pub use types::LeaseRead;
pub use types::LogBatch;
pub use types::RaftRole;
pub use types::RaftStatus;
pub use types::WrittenLogs;
pub use wiring::try_create_raft_consensus;
pub use wiring::RaftConfig;
pub use wiring::RaftConsensus;
pub use wiring::RaftCreationError;
