use crate::actor::{Callback, Event};
use crate::commitlog::Index;
use crate::mail::Mail;
use crate::peers::ActorId;
use crate::replica;
use tokio::sync::{mpsc, oneshot};

/// The replica actor has exited, so the event could not be delivered.
#[derive(Debug, thiserror::Error)]
#[error("Replica actor has exited")]
pub(crate) struct ActorExited;

/// ActorClient is the handle the application side holds to talk to the replica actor. The actor
/// runs until every `ActorClient` is dropped.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);

        (ActorClient { sender: tx }, rx)
    }

    /// A weak client doesn't keep the actor alive. Timers and in-flight rounds hold these.
    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn write(
        &self,
        input: replica::WriteLogsInput,
    ) -> Result<replica::WriteLogsOutput, replica::WriteLogsError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Write(input, Callback(tx)))
            .await
            .map_err(|_| replica::WriteLogsError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::WriteLogsError::ActorExited))
    }

    /// Answer an inbound request mail. A dead actor answers nothing, which reads as an empty mail.
    pub(crate) async fn generate_response(&self, mail: Mail) -> Mail {
        let (tx, rx) = oneshot::channel();
        if self.send(Event::GenerateResponse(mail, tx)).await.is_err() {
            return Mail::empty();
        }

        rx.await.unwrap_or_else(|_| Mail::empty())
    }

    pub(crate) async fn receive_mail(&self, from: ActorId, mail: Mail) -> Result<(), ActorExited> {
        self.send(Event::ReceiveMail { from, mail }).await
    }

    pub(crate) async fn advance(&self) -> Result<(), ActorExited> {
        self.send(Event::Advance).await
    }

    pub(crate) async fn prepare_peers(
        &self,
    ) -> Result<replica::ConsensusChangeResult, replica::PeersChangeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::PreparePeers(Callback(tx)))
            .await
            .map_err(|_| replica::PeersChangeError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::PeersChangeError::ActorExited))
    }

    pub(crate) async fn configurate_peers(
        &self,
        input: replica::ConfiguratePeersInput,
    ) -> Result<replica::ConsensusChangeResult, replica::PeersChangeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::ConfiguratePeers(input, Callback(tx)))
            .await
            .map_err(|_| replica::PeersChangeError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::PeersChangeError::ActorExited))
    }

    pub(crate) async fn abort_peers(
        &self,
    ) -> Result<replica::ConsensusChangeResult, replica::PeersChangeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::AbortPeers(Callback(tx)))
            .await
            .map_err(|_| replica::PeersChangeError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::PeersChangeError::ActorExited))
    }

    pub(crate) async fn drop_logs_until(&self, index: Index) -> Result<(), replica::DropLogsError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::DropLogsUntil(index, Callback(tx)))
            .await
            .map_err(|_| replica::DropLogsError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::DropLogsError::ActorExited))
    }

    pub(crate) async fn lease_read(&self) -> Result<replica::LeaseReadOutput, replica::LeaseReadError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::LeaseRead(Callback(tx)))
            .await
            .map_err(|_| replica::LeaseReadError::ActorExited)?;

        rx.await.unwrap_or(Err(replica::LeaseReadError::ActorExited))
    }

    pub(crate) async fn status(&self) -> Result<replica::ReplicaStatus, ActorExited> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Status(tx)).await?;

        rx.await.map_err(|_| ActorExited)
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// WeakActorClient delivers internal events (timers, replies, quorum decisions) without keeping
/// the actor alive.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) async fn receive_mail(&self, from: ActorId, mail: Mail) -> Result<(), ActorExited> {
        self.send(Event::ReceiveMail { from, mail }).await
    }

    pub(crate) async fn follower_timeout(&self, term: replica::Term) -> Result<(), ActorExited> {
        self.send(Event::FollowerTimeout(term)).await
    }

    pub(crate) async fn leader_timer(&self, tick: replica::LeaderTimerTick) -> Result<(), ActorExited> {
        self.send(Event::LeaderTimer(tick)).await
    }

    pub(crate) async fn quorum_decided(&self, decided: replica::QuorumDecided) -> Result<(), ActorExited> {
        self.send(Event::QuorumDecided(decided)).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        match self.sender.upgrade() {
            Some(sender) => sender.send(event).await.map_err(|_| ActorExited),
            None => Err(ActorExited),
        }
    }
}
