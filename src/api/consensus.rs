use crate::actor::ActorClient;
use crate::api::errors::{ConsensusExited, DropLogsError, LeaseReadError, MembershipError, WriteError};
use crate::api::types::{LeaseRead, LogBatch, RaftRole, RaftStatus, WrittenLogs};
use crate::commitlog::Index;
use crate::mail::{Mail, RaftMailExtractor};
use crate::peers::{ActorId, ConsensusPeersConfiguration};
use crate::replica;
use crate::replica::{ConsensusChangeResult, PeersTransform};

/// Consensus is what the application drives: writes, membership changes, compaction and reads.
#[async_trait::async_trait]
pub trait Consensus: Send + Sync {
    /// Nudge the replica. A leader replicates and refreshes its lease; a follower that lost its
    /// leader starts a prevote.
    async fn advance(&self) -> Result<(), ConsensusExited>;

    /// Append `batch` and resolve once it is committed.
    async fn write(&self, batch: LogBatch) -> Result<WrittenLogs, WriteError>;

    async fn prepare_peers_changes(&self) -> Result<ConsensusChangeResult, MembershipError>;
    async fn configurate_peers(&self, transform: PeersTransform) -> Result<ConsensusChangeResult, MembershipError>;
    async fn abort_peers_changes(&self) -> Result<ConsensusChangeResult, MembershipError>;

    /// The application must have captured its state as of `index` in the snapshot store first.
    async fn drop_logs_until(&self, index: u64) -> Result<(), DropLogsError>;

    async fn lease_read(&self) -> Result<LeaseRead, LeaseReadError>;

    async fn status(&self) -> Result<RaftStatus, ConsensusExited>;

    async fn role(&self) -> Result<RaftRole, ConsensusExited> {
        Ok(self.status().await?.role)
    }

    async fn term(&self) -> Result<u64, ConsensusExited> {
        Ok(self.status().await?.term)
    }

    async fn commit_index(&self) -> Result<Option<u64>, ConsensusExited> {
        Ok(self.status().await?.commit_index)
    }

    async fn last_applied_index(&self) -> Result<Option<u64>, ConsensusExited> {
        Ok(self.status().await?.last_applied_index)
    }

    async fn epoch(&self) -> Result<u64, ConsensusExited> {
        Ok(self.status().await?.epoch())
    }

    async fn peers_configuration(&self) -> Result<ConsensusPeersConfiguration, ConsensusExited> {
        Ok(self.status().await?.peers)
    }

    /// The local replica currently accepts writes.
    async fn writable(&self) -> Result<bool, ConsensusExited> {
        Ok(self.status().await?.role == RaftRole::Leader)
    }

    /// A prepared membership change has been applied, so `configurate_peers` can go ahead here.
    async fn peers_changeable(&self) -> Result<bool, ConsensusExited> {
        let status = self.status().await?;
        Ok(status.role == RaftRole::Leader && status.peers.locked)
    }

    /// The member that currently accepts writes, as far as the local replica knows.
    async fn writer(&self) -> Result<Option<ActorId>, ConsensusExited> {
        Ok(self.status().await?.leader)
    }
}

/// MailReceiver is what the transport drives with inbound mail.
#[async_trait::async_trait]
pub trait MailReceiver: Send + Sync {
    fn is_consensus_mail(&self, mail: &Mail) -> bool {
        RaftMailExtractor::is_consensus_mail(mail)
    }

    /// Answer a request mail. Anything that isn't a consensus request gets an empty mail.
    async fn generate_response(&self, mail: Mail) -> Mail;

    /// Hand over a reply that arrived outside of `RemoteActor::post`.
    async fn receive(&self, mail: Mail, from: ActorId) -> Result<(), ConsensusExited>;
}

/// RaftConsensusHandle is the application's handle to one local replica. Clones talk to the same
/// replica, which runs until every clone is dropped.
#[derive(Clone)]
pub struct RaftConsensusHandle {
    actor_client: ActorClient,
}

impl RaftConsensusHandle {
    pub(crate) fn new(actor_client: ActorClient) -> Self {
        RaftConsensusHandle { actor_client }
    }
}

#[async_trait::async_trait]
impl Consensus for RaftConsensusHandle {
    async fn advance(&self) -> Result<(), ConsensusExited> {
        self.actor_client.advance().await.map_err(ConsensusExited::from)
    }

    async fn write(&self, batch: LogBatch) -> Result<WrittenLogs, WriteError> {
        let replica_input = replica::WriteLogsInput { batch: batch.entries };

        self.actor_client
            .write(replica_input)
            .await
            .map(WrittenLogs::from)
            .map_err(WriteError::from)
    }

    async fn prepare_peers_changes(&self) -> Result<ConsensusChangeResult, MembershipError> {
        self.actor_client
            .prepare_peers()
            .await
            .map_err(MembershipError::from)
    }

    async fn configurate_peers(&self, transform: PeersTransform) -> Result<ConsensusChangeResult, MembershipError> {
        self.actor_client
            .configurate_peers(replica::ConfiguratePeersInput { transform })
            .await
            .map_err(MembershipError::from)
    }

    async fn abort_peers_changes(&self) -> Result<ConsensusChangeResult, MembershipError> {
        self.actor_client
            .abort_peers()
            .await
            .map_err(MembershipError::from)
    }

    async fn drop_logs_until(&self, index: u64) -> Result<(), DropLogsError> {
        let index = match Index::from_u64(index) {
            Some(index) => index,
            // Nothing precedes the first entry.
            None => return Ok(()),
        };

        self.actor_client
            .drop_logs_until(index)
            .await
            .map_err(DropLogsError::from)
    }

    async fn lease_read(&self) -> Result<LeaseRead, LeaseReadError> {
        self.actor_client
            .lease_read()
            .await
            .map(LeaseRead::from)
            .map_err(LeaseReadError::from)
    }

    async fn status(&self) -> Result<RaftStatus, ConsensusExited> {
        let status = self.actor_client.status().await?;
        Ok(RaftStatus::from(status))
    }
}

#[async_trait::async_trait]
impl MailReceiver for RaftConsensusHandle {
    async fn generate_response(&self, mail: Mail) -> Mail {
        if !RaftMailExtractor::mail_type(&mail).is_request() {
            return Mail::empty();
        }
        self.actor_client.generate_response(mail).await
    }

    async fn receive(&self, mail: Mail, from: ActorId) -> Result<(), ConsensusExited> {
        self.actor_client
            .receive_mail(from, mail)
            .await
            .map_err(ConsensusExited::from)
    }
}
