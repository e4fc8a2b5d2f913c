use crate::mail::Mail;
use crate::peers::ActorId;
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0:?} is unreachable")]
    Unreachable(ActorId),
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error("transport failure: {0}")]
    Other(String),
}

/// RemoteActor is the local proxy of one remote cluster member. `post()` delivers a request mail
/// and resolves with the reply mail. Connection handling and framing live behind this trait.
#[async_trait::async_trait]
pub trait RemoteActor: Send + Sync {
    async fn post(&self, mail: Mail) -> Result<Mail, TransportError>;
}

/// RemoteActorFactory creates proxies for members learned from a membership change or snapshot.
pub trait RemoteActorFactory: Send + Sync {
    fn create(&self, id: &ActorId) -> Arc<dyn RemoteActor>;
}
