use crate::actor::WeakActorClient;
use crate::mail::{Mail, RaftMailExtractor};
use crate::peers::{ActorId, RemoteActor, TransportError};
use crate::quorum::{ProposeError, QuorumProposer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

/// One request mail per recipient for a single broadcast round.
pub(crate) type OutboundMails = Arc<HashMap<ActorId, Mail>>;

/// MailProposer posts this peer's mail, hands the reply back to the local actor, then reads the
/// reply as a quorum vote. The reply is queued on the actor before the vote is counted, so the
/// actor always observes a reply before the decision it contributed to.
pub(crate) struct MailProposer {
    logger: slog::Logger,
    peer: ActorId,
    remote: Arc<dyn RemoteActor>,
    receiver: WeakActorClient,
    reply_timeout: Duration,
}

impl MailProposer {
    pub(crate) fn new(
        logger: slog::Logger,
        peer: ActorId,
        remote: Arc<dyn RemoteActor>,
        receiver: WeakActorClient,
        reply_timeout: Duration,
    ) -> Self {
        MailProposer {
            logger,
            peer,
            remote,
            receiver,
            reply_timeout,
        }
    }
}

#[async_trait::async_trait]
impl QuorumProposer<OutboundMails> for MailProposer {
    async fn propose(&self, mails: OutboundMails) -> Result<bool, ProposeError> {
        let mail = match mails.get(&self.peer) {
            Some(mail) => mail.clone(),
            None => return Ok(false),
        };

        let reply = match tokio::time::timeout(self.reply_timeout, self.remote.post(mail)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                slog::debug!(self.logger, "Post to {:?} failed: {}", self.peer, e);
                return Err(e.into());
            }
            Err(_elapsed) => {
                slog::debug!(self.logger, "Post to {:?} timed out", self.peer);
                return Err(TransportError::Timeout.into());
            }
        };
        if reply.is_empty() {
            return Ok(false);
        }

        let granted = RaftMailExtractor::is_granted(&reply);
        self.receiver
            .receive_mail(self.peer, reply)
            .await
            .map_err(|_| ProposeError::ActorExited)?;

        Ok(granted)
    }
}

/// The local node's own voice in every quorum it starts.
pub(crate) struct LocalProposer;

#[async_trait::async_trait]
impl QuorumProposer<OutboundMails> for LocalProposer {
    async fn propose(&self, _mails: OutboundMails) -> Result<bool, ProposeError> {
        Ok(true)
    }
}
