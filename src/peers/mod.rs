mod actor_id;
mod configuration;
mod peer_quorum;
mod proposer;
mod remote;

pub use actor_id::ActorId;
pub use actor_id::ACTOR_ID_LEN;
pub use configuration::ConsensusPeersConfiguration;
pub use peer_quorum::PeerQuorum;
pub use remote::RemoteActor;
pub use remote::RemoteActorFactory;
pub use remote::TransportError;

pub(crate) use proposer::LocalProposer;
pub(crate) use proposer::MailProposer;
pub(crate) use proposer::OutboundMails;
