//! Consensus mail: the envelope, the protobuf bodies and the typed raft messages they carry.
pub(crate) mod codec;
mod extractor;
mod mail;
mod messages;
mod wire;

pub use codec::CorruptedDataError;
pub use extractor::ExtractError;
pub use extractor::RaftMailBuilder;
pub use extractor::RaftMailExtractor;
pub use extractor::RaftMailType;
pub use extractor::RaftMessage;
pub use mail::Mail;
pub use messages::HeartbeatRequest;
pub use messages::HeartbeatResponse;
pub use messages::SnapshotMetadata;
pub use messages::SnapshotRequest;
pub use messages::SnapshotResponse;
pub use messages::VoteRequest;
pub use messages::VoteResponse;
pub use messages::WireEntry;
