use crate::actor::WeakActorClient;
use crate::commitlog::{Index, Log};
use crate::peers::{ActorId, RemoteActorFactory};
use crate::replica::consensus_listener::{self, ConsensusSnapshot, ConsensusStateListener};
use crate::replica::election::{ElectionConfig, ElectionState};
use crate::replica::local_state::{DurableLocalState, LoadStateError, PersistentLocalState};
use crate::replica::replica::{Replica, ReplicaConfig, ReplicaOptions};
use crate::replica::snapshot::SnapshotStore;
use crate::replica::status_map::StatusMap;
use crate::replica::write_ahead_log::{self, CommitStream, RaftLogEntry};
use crate::replica::{ReplicaRole, Term};
use std::io;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReplicaCreationError {
    #[error("Persisted state is unusable: {0}")]
    CorruptedState(#[from] LoadStateError),
    #[error("Failed to open the log: {0}")]
    LogInitialization(#[from] io::Error),
}

/// Everything the replica needs from the application, in one place.
pub(crate) struct ReplicaParts<L> {
    pub(crate) my_id: ActorId,
    pub(crate) initial_members: Vec<ActorId>,
    pub(crate) log: L,
    pub(crate) status_map: Box<dyn StatusMap>,
    pub(crate) snapshots: Box<dyn SnapshotStore>,
    pub(crate) remote_factory: Arc<dyn RemoteActorFactory>,
}

/// Load durable state, recover the log on top of it and build a replica that starts out as a
/// follower of its persisted term.
pub(crate) fn create_replica<L>(
    logger: slog::Logger,
    parts: ReplicaParts<L>,
    actor_client: WeakActorClient,
    election_config: ElectionConfig,
    options: ReplicaOptions,
) -> Result<(Replica<L>, CommitStream, ConsensusStateListener), ReplicaCreationError>
where
    L: Log<RaftLogEntry> + 'static,
{
    let local_state = DurableLocalState::load(parts.my_id, parts.status_map, parts.initial_members)?;

    let snapshot_base = local_state.snapshot_metadata().and_then(|metadata| {
        Index::from_u64(metadata.last_index).map(|index| (Term::new(metadata.last_term), index))
    });
    let (wal, commit_stream) = write_ahead_log::wired(
        logger.clone(),
        parts.log,
        snapshot_base,
        local_state.last_applied(),
    )?;
    slog::info!(
        logger,
        "Recovered log: latest {:?}, snapshot base {:?}, applied {:?}, term {:?}",
        wal.latest_entry(),
        snapshot_base,
        wal.last_applied_index(),
        local_state.current_term()
    );

    let current_term = local_state.current_term();
    let (notifier, listener) = consensus_listener::new(ConsensusSnapshot {
        role: ReplicaRole::Follower,
        term: current_term,
        leader: None,
        commit_index: wal.commit_index(),
        epoch: local_state.peers_configuration().epoch,
    });
    let election_state = ElectionState::new_follower(election_config, actor_client.clone(), current_term);

    let replica = Replica::new(ReplicaConfig {
        logger,
        my_id: parts.my_id,
        local_state: Box::new(local_state),
        election_state,
        wal,
        remote_factory: parts.remote_factory,
        snapshots: parts.snapshots,
        actor_client,
        notifier,
        options,
    });

    Ok((replica, commit_stream, listener))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::commitlog::InMemoryLog;
    use crate::mail::codec::Encode;
    use crate::mail::{
        HeartbeatRequest, HeartbeatResponse, Mail, RaftMailBuilder, RaftMailExtractor, RaftMessage, VoteRequest,
        WireEntry,
    };
    use crate::peers::{RemoteActor, TransportError};
    use crate::replica::snapshot::InMemorySnapshotStore;
    use crate::replica::status_map::InMemoryStatusMap;
    use crate::replica::write_ahead_log::EntryPayload;
    use bytes::Bytes;
    use tokio::time::Duration;

    struct Unreachable(ActorId);

    #[async_trait::async_trait]
    impl RemoteActor for Unreachable {
        async fn post(&self, _mail: Mail) -> Result<Mail, TransportError> {
            Err(TransportError::Unreachable(self.0))
        }
    }

    struct UnreachableFactory;

    impl RemoteActorFactory for UnreachableFactory {
        fn create(&self, id: &ActorId) -> Arc<dyn RemoteActor> {
            Arc::new(Unreachable(*id))
        }
    }

    fn id(v: u64) -> ActorId {
        ActorId::from(v)
    }

    fn new_replica(status_map: InMemoryStatusMap) -> (Replica<InMemoryLog<RaftLogEntry>>, ActorClient) {
        let (client, _rx) = ActorClient::new(16);
        let parts = ReplicaParts {
            my_id: id(1),
            initial_members: vec![id(2), id(3)],
            log: InMemoryLog::create().unwrap(),
            status_map: Box::new(status_map),
            snapshots: Box::new(InMemorySnapshotStore::new()),
            remote_factory: Arc::new(UnreachableFactory),
        };
        let election_config = ElectionConfig {
            my_id: id(1),
            leader_heartbeat_duration: Duration::from_secs(60),
            follower_min_timeout: Duration::from_secs(60),
            follower_max_timeout: Duration::from_secs(120),
        };
        let options = ReplicaOptions {
            lease_duration: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(1),
            snapshot_chunk_size: 1024,
            max_entries_per_request: 16,
            follower_min_timeout: Duration::from_secs(60),
        };

        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let (replica, _stream, _listener) =
            create_replica(logger, parts, client.weak(), election_config, options).unwrap();
        (replica, client)
    }

    fn vote(replica: &mut Replica<InMemoryLog<RaftLogEntry>>, term: u64, candidate: u64, last_log: (u64, u64)) -> bool {
        let request = VoteRequest {
            term,
            candidate: id(candidate),
            last_log_index: last_log.0,
            last_log_term: last_log.1,
        };
        let reply = replica.generate_response(RaftMailBuilder::build(&RaftMessage::VoteRequest(request)));
        RaftMailExtractor::is_granted(&reply)
    }

    fn append(
        replica: &mut Replica<InMemoryLog<RaftLogEntry>>,
        term: u64,
        prev_log: (u64, u64),
        entries: &[(u64, &'static str)],
        leader_commit: u64,
    ) -> HeartbeatResponse {
        let request = HeartbeatRequest {
            term,
            leader: id(2),
            prev_log_index: prev_log.0,
            prev_log_term: prev_log.1,
            entries: entries
                .iter()
                .map(|&(term, data)| WireEntry {
                    term,
                    payload: EntryPayload::Data(Bytes::from(data)).encode_to_bytes(),
                })
                .collect(),
            leader_commit,
            lease_round: 1,
        };
        let reply = replica.generate_response(RaftMailBuilder::build(&RaftMessage::HeartbeatRequest(request)));
        match RaftMailExtractor::extract(&reply) {
            Ok(RaftMessage::HeartbeatResponse(response)) => response,
            other => panic!("Expected a heartbeat response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn follower_truncates_conflicting_suffix() {
        let (mut replica, _client) = new_replica(InMemoryStatusMap::new());

        let response = append(&mut replica, 1, (0, 0), &[(1, "a"), (1, "b"), (1, "c")], 0);
        assert!(response.success);
        assert_eq!(response.match_index, 3);

        // Index 2 holds a term 1 entry, so the new leader has to back up. The hint is our last index.
        let response = append(&mut replica, 2, (2, 2), &[], 0);
        assert!(!response.success);
        assert_eq!(response.term, 2);
        assert_eq!(response.match_index, 3);

        let response = append(&mut replica, 2, (1, 1), &[(2, "x")], 2);
        assert!(response.success);
        assert_eq!(response.match_index, 2);
        assert_eq!(replica.status().commit_index, Index::from_u64(2));

        // Index 3 went with the conflicting suffix.
        let response = append(&mut replica, 2, (3, 1), &[], 2);
        assert!(!response.success);
        assert_eq!(response.match_index, 2);
    }

    #[tokio::test]
    async fn stale_leader_learns_the_current_term() {
        let (mut replica, _client) = new_replica(InMemoryStatusMap::new());
        assert!(append(&mut replica, 2, (0, 0), &[(2, "a")], 0).success);

        let response = append(&mut replica, 1, (1, 2), &[(1, "stale")], 1);

        assert!(!response.success);
        assert_eq!(response.term, 2);
        assert_eq!(response.match_index, 1);
        assert_eq!(replica.status().term, Term::new(2));
        assert_eq!(replica.status().commit_index, None);
    }

    #[tokio::test]
    async fn one_vote_per_term_survives_restart() {
        let status_map = InMemoryStatusMap::new();
        {
            let (mut replica, _client) = new_replica(status_map.clone());
            assert!(vote(&mut replica, 3, 2, (0, 0)));
            // Retried request from the same candidate is still granted.
            assert!(vote(&mut replica, 3, 2, (0, 0)));
            assert!(!vote(&mut replica, 3, 3, (0, 0)));
        }

        let (mut replica, _client) = new_replica(status_map);
        assert_eq!(replica.status().term, Term::new(3));
        assert!(!vote(&mut replica, 3, 3, (0, 0)));
        assert!(vote(&mut replica, 4, 3, (0, 0)));
    }

    #[tokio::test]
    async fn strangers_and_stale_terms_are_refused() {
        let (mut replica, _client) = new_replica(InMemoryStatusMap::new());

        assert!(!vote(&mut replica, 1, 9, (0, 0)));
        assert!(vote(&mut replica, 2, 2, (0, 0)));
        assert!(!vote(&mut replica, 1, 3, (5, 1)));
    }

    #[tokio::test]
    async fn non_requests_get_an_empty_reply() {
        let (mut replica, _client) = new_replica(InMemoryStatusMap::new());

        assert!(replica.generate_response(Mail::empty()).is_empty());
        assert_eq!(replica.status().role, ReplicaRole::Follower);
        assert_eq!(replica.status().peers.members.len(), 3);
    }
}
