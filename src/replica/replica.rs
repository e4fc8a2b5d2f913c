mod elections;
mod peers_changes;
mod replication;
mod snapshots;

use crate::actor::{Callback, WeakActorClient};
use crate::commitlog::{Index, Log};
use crate::mail::{Mail, RaftMailBuilder, RaftMailExtractor, RaftMessage};
use crate::peers::{ActorId, LocalProposer, MailProposer, OutboundMails, PeerQuorum, RemoteActorFactory};
use crate::quorum::{self, QuorumProposer};
use crate::replica::consensus_listener::{ConsensusSnapshot, ConsensusStateNotifier};
use crate::replica::election::ElectionState;
use crate::replica::membership::{self, MembershipTracker};
use crate::replica::snapshot::{SnapshotReceiver, SnapshotStore};
use crate::replica::write_ahead_log::{AppliedControl, EntryPayload, WriteAheadLog};
use crate::replica::{
    ConsensusChangeResult, LeaseReadError, LeaseReadOutput, PeersChangeError, PersistentLocalState, QuorumDecided,
    RaftLogEntry, ReplicaRole, ReplicaStatus, RoundKind, Term, WriteLogsError, WriteLogsOutput,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Knobs of the state machine that aren't about election timing.
#[derive(Clone, Debug)]
pub(crate) struct ReplicaOptions {
    pub(crate) lease_duration: Duration,
    pub(crate) reply_timeout: Duration,
    pub(crate) snapshot_chunk_size: usize,
    pub(crate) max_entries_per_request: usize,
    pub(crate) follower_min_timeout: Duration,
}

pub(in crate::replica) struct ReplicaConfig<L>
where
    L: Log<RaftLogEntry>,
{
    pub(in crate::replica) logger: slog::Logger,
    pub(in crate::replica) my_id: ActorId,
    pub(in crate::replica) local_state: Box<dyn PersistentLocalState>,
    pub(in crate::replica) election_state: ElectionState,
    pub(in crate::replica) wal: WriteAheadLog<L>,
    pub(in crate::replica) remote_factory: Arc<dyn RemoteActorFactory>,
    pub(in crate::replica) snapshots: Box<dyn SnapshotStore>,
    pub(in crate::replica) actor_client: WeakActorClient,
    pub(in crate::replica) notifier: ConsensusStateNotifier,
    pub(in crate::replica) options: ReplicaOptions,
}

/// Replica is the consensus state machine. It is owned by the replica actor, so every method
/// runs to completion before the next event is handled. Remote calls happen on spawned tasks,
/// which only ever talk back through the actor queue.
pub(crate) struct Replica<L>
where
    L: Log<RaftLogEntry>,
{
    logger: slog::Logger,
    my_id: ActorId,
    local_state: Box<dyn PersistentLocalState>,
    election_state: ElectionState,
    wal: WriteAheadLog<L>,

    // Remote voters of the applied configuration. Swapped whole on a membership change; rounds
    // already in flight keep the quorum they started with.
    quorum: Arc<PeerQuorum>,
    remote_factory: Arc<dyn RemoteActorFactory>,

    snapshots: Box<dyn SnapshotStore>,
    snapshot_receiver: SnapshotReceiver,
    membership: MembershipTracker,

    // Leader only. Keyed by the last index of what they wait for.
    pending_writes: BTreeMap<Index, (WriteLogsOutput, Callback<WriteLogsOutput, WriteLogsError>)>,
    pending_peer_changes: BTreeMap<Index, Callback<ConsensusChangeResult, PeersChangeError>>,

    actor_client: WeakActorClient,
    options: ReplicaOptions,
    // Bumped by every prevote and vote round so that a late decision can't act on a newer one.
    election_attempt: u64,
    started_at: Instant,
    notifier: ConsensusStateNotifier,
}

impl<L> Replica<L>
where
    L: Log<RaftLogEntry> + 'static,
{
    pub(in crate::replica) fn new(config: ReplicaConfig<L>) -> Self {
        let remote_ids = config.local_state.peers_configuration().remote_members(&config.my_id);
        let quorum = PeerQuorum::rebuild(&remote_ids, &PeerQuorum::new(), &*config.remote_factory);

        Replica {
            logger: config.logger,
            my_id: config.my_id,
            local_state: config.local_state,
            election_state: config.election_state,
            wal: config.wal,
            quorum: Arc::new(quorum),
            remote_factory: config.remote_factory,
            snapshots: config.snapshots,
            snapshot_receiver: SnapshotReceiver::default(),
            membership: MembershipTracker::default(),
            pending_writes: BTreeMap::new(),
            pending_peer_changes: BTreeMap::new(),
            actor_client: config.actor_client,
            options: config.options,
            election_attempt: 0,
            started_at: Instant::now(),
            notifier: config.notifier,
        }
    }

    /// Answer an inbound request. Anything that isn't a consensus request gets an empty mail.
    pub(crate) fn generate_response(&mut self, mail: Mail) -> Mail {
        let message = match RaftMailExtractor::extract(&mail) {
            Ok(message) => message,
            Err(e) => {
                slog::debug!(self.logger, "Not answering mail: {}", e);
                return Mail::empty();
            }
        };

        let reply = match message {
            RaftMessage::PrevoteRequest(request) => RaftMessage::PrevoteResponse(self.handle_prevote_request(request)),
            RaftMessage::VoteRequest(request) => RaftMessage::VoteResponse(self.handle_vote_request(request)),
            RaftMessage::HeartbeatRequest(request) => {
                RaftMessage::HeartbeatResponse(self.handle_heartbeat_request(request))
            }
            RaftMessage::SnapshotRequest(request) => {
                RaftMessage::SnapshotResponse(self.handle_snapshot_request(request))
            }
            response => {
                slog::debug!(self.logger, "Not answering a {:?}", response.mail_type());
                return Mail::empty();
            }
        };

        RaftMailBuilder::build(&reply)
    }

    /// Fold in a peer's reply to one of our broadcasts.
    pub(crate) fn receive_mail(&mut self, from: ActorId, mail: Mail) {
        let message = match RaftMailExtractor::extract(&mail) {
            Ok(message) => message,
            Err(e) => {
                slog::warn!(self.logger, "Dropping reply from {:?}: {}", from, e);
                return;
            }
        };

        match message {
            RaftMessage::PrevoteResponse(response) => self.handle_prevote_response(from, response),
            RaftMessage::VoteResponse(response) => self.handle_vote_response(from, response),
            RaftMessage::HeartbeatResponse(response) => self.handle_heartbeat_response(from, response),
            RaftMessage::SnapshotResponse(response) => self.handle_snapshot_response(from, response),
            request => {
                slog::warn!(self.logger, "{:?} sent a {:?} as a reply", from, request.mail_type());
            }
        }
    }

    pub(crate) fn advance(&mut self) {
        let now = Instant::now();
        if self.election_state.is_leader() {
            self.start_heartbeat_round();
        } else if self.election_state.role() == ReplicaRole::Follower
            && now.saturating_duration_since(self.started_at) >= self.options.follower_min_timeout
            && !self
                .election_state
                .heard_from_leader_within(self.options.follower_min_timeout, now)
        {
            slog::info!(self.logger, "No leader contact for {:?}", self.options.follower_min_timeout);
            self.start_prevote();
        }

        self.apply_committed_entries();
    }

    pub(crate) fn handle_quorum_decided(&mut self, decided: QuorumDecided) {
        let current_term = self.local_state.current_term();
        if decided.term != current_term {
            slog::debug!(
                self.logger,
                "Ignoring {:?} decision for term {:?}, current term: {:?}",
                decided.kind,
                decided.term,
                current_term
            );
            return;
        }

        match decided.kind {
            RoundKind::Prevote => self.prevote_decided(decided.round, decided.granted),
            RoundKind::Vote => self.vote_decided(decided.round, decided.granted),
            RoundKind::Heartbeat => {
                if !decided.granted {
                    slog::debug!(self.logger, "Heartbeat round {} didn't reach a majority", decided.round);
                    return;
                }
                let lease_duration = self.options.lease_duration;
                if let Some(leader_state) = self.election_state.leader_state_mut() {
                    leader_state.lease.extend(decided.started_at, lease_duration);
                }
            }
        }
    }

    /// Serve a read locally if a majority acknowledged us within the lease duration.
    pub(crate) fn lease_read(&self) -> Result<LeaseReadOutput, LeaseReadError> {
        let leader_state = match self.election_state.leader_state() {
            Some(leader_state) => leader_state,
            None => {
                return Err(LeaseReadError::NotLeader {
                    leader: self.election_state.leader(),
                })
            }
        };
        if !leader_state.lease.is_valid_at(Instant::now()) {
            return Err(LeaseReadError::LeaseExpired);
        }

        Ok(LeaseReadOutput {
            term: self.local_state.current_term(),
            commit_index: self.wal.commit_index(),
        })
    }

    pub(crate) fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            role: self.election_state.role(),
            term: self.local_state.current_term(),
            leader: self.election_state.leader(),
            commit_index: self.wal.commit_index(),
            last_applied_index: self.wal.last_applied_index(),
            peers: self.local_state.peers_configuration().clone(),
        }
    }

    pub(crate) fn publish_state(&self) {
        self.notifier.notify_if_changed(ConsensusSnapshot {
            role: self.election_state.role(),
            term: self.local_state.current_term(),
            leader: self.election_state.leader(),
            commit_index: self.wal.commit_index(),
            epoch: self.local_state.peers_configuration().epoch,
        });
    }

    /// Send one mail per peer and report the quorum decision back to the actor. The local node
    /// is always one granted participant.
    fn broadcast(&self, kind: RoundKind, term: Term, round: u64, mails: HashMap<ActorId, Mail>) {
        let mut proposers: Vec<Arc<dyn QuorumProposer<OutboundMails>>> = Vec::with_capacity(self.quorum.len() + 1);
        proposers.push(Arc::new(LocalProposer));
        for (peer_id, remote) in self.quorum.iter() {
            proposers.push(Arc::new(MailProposer::new(
                self.logger.new(slog::o!("Peer" => format!("{:?}", peer_id))),
                *peer_id,
                remote.clone(),
                self.actor_client.clone(),
                self.options.reply_timeout,
            )));
        }

        let started_at = Instant::now();
        let handle = quorum::propose(proposers, Arc::new(mails));
        slog::debug!(
            self.logger,
            "Started {:?} round {} for {:?}, {} grants needed",
            kind,
            round,
            term,
            handle.majority()
        );
        // Replies are routed through the actor as they arrive, so only the decision matters here.
        let (decision, _finished) = handle.split();
        let actor_client = self.actor_client.clone();
        tokio::task::spawn(async move {
            let granted = decision.wait().await;
            let decided = QuorumDecided {
                kind,
                term,
                round,
                started_at,
                granted,
            };
            // The actor is gone if this fails, and nobody is left to care.
            let _ = actor_client.quorum_decided(decided).await;
        });
    }

    /// Adopt `term` if it is newer than ours. Returns true if we stepped down to follower.
    fn observe_term(&mut self, term: Term, leader: Option<ActorId>) -> Result<bool, std::io::Error> {
        if self.local_state.store_term_if_increased(term)? {
            slog::info!(self.logger, "Observed newer term {:?}, stepping down", term);
            self.become_follower(term, leader);
            return Ok(true);
        }
        Ok(false)
    }

    fn become_follower(&mut self, term: Term, leader: Option<ActorId>) {
        let was_leader = self.election_state.is_leader();
        self.election_state.transition_to_follower(term, leader);

        if was_leader {
            self.abandon_leader_work();
        }
    }

    // Uncommitted work of a deposed leader may still commit under the next leader, but this
    // replica can no longer tell.
    fn abandon_leader_work(&mut self) {
        for (_, (_, callback)) in std::mem::take(&mut self.pending_writes) {
            callback.send(Err(WriteLogsError::Superseded));
        }
        for (_, callback) in std::mem::take(&mut self.pending_peer_changes) {
            callback.send(Err(PeersChangeError::Superseded));
        }
        self.membership.clear();
    }

    fn is_member(&self, id: &ActorId) -> bool {
        self.local_state.peers_configuration().members.contains(id)
    }

    fn num_voters(&self) -> usize {
        self.quorum.len() + 1
    }

    /// Apply everything committed: data goes to the commit stream, control entries are applied
    /// here. Then resolve whatever the applied entries were waiting on.
    fn apply_committed_entries(&mut self) {
        let controls = match self.wal.apply_all_committed_entries() {
            Ok(controls) => controls,
            Err(e) => {
                slog::error!(self.logger, "Failed to apply committed entries: {:?}", e);
                return;
            }
        };
        for control in controls {
            self.apply_control(control);
        }

        if let Some(applied) = self.wal.last_applied_index() {
            if self.local_state.last_applied() != Some(applied) {
                if let Err(e) = self.local_state.store_last_applied(applied) {
                    slog::error!(self.logger, "Failed to persist last applied {:?}: {:?}", applied, e);
                }
            }
            self.membership.applied_through(applied);
        }

        self.resolve_pending_work();
    }

    fn apply_control(&mut self, control: AppliedControl) {
        let active = self.local_state.peers_configuration().clone();
        let next = match membership::apply_to(&active, &control.payload) {
            Some(next) => next,
            None => return,
        };

        slog::info!(self.logger, "Applying membership entry {:?}: {:?}", control.index, next);
        if let Err(e) = self.local_state.store_peers_configuration(next) {
            slog::error!(self.logger, "Failed to persist peers configuration: {:?}", e);
            return;
        }
        if let EntryPayload::ConfigurePeers(_) = control.payload {
            self.install_quorum();
        }
    }

    /// Swap in the quorum of the applied configuration. Remotes from the proposed quorum (or the
    /// previous one) are reused, anything else comes from the factory.
    fn install_quorum(&mut self) {
        let remote_ids = self.local_state.peers_configuration().remote_members(&self.my_id);
        let previous = match self.membership.take_quorum() {
            Some(proposed) => proposed,
            None => (*self.quorum).clone(),
        };

        self.quorum = Arc::new(PeerQuorum::rebuild(&remote_ids, &previous, &*self.remote_factory));
        if let Some(leader_state) = self.election_state.leader_state_mut() {
            leader_state.tracker.sync_peers(&remote_ids);
        }
        slog::info!(self.logger, "Installed quorum {:?}", self.quorum);
    }

    fn resolve_pending_work(&mut self) {
        if let Some(commit_index) = self.wal.commit_index() {
            let still_pending = self.pending_writes.split_off(&commit_index.plus(1));
            for (_, (output, callback)) in std::mem::replace(&mut self.pending_writes, still_pending) {
                callback.send(Ok(output));
            }
        }

        if let Some(applied) = self.wal.last_applied_index() {
            let still_pending = self.pending_peer_changes.split_off(&applied.plus(1));
            for (_, callback) in std::mem::replace(&mut self.pending_peer_changes, still_pending) {
                callback.send(Ok(ConsensusChangeResult::Success));
            }
        }
    }
}

/// The highest index stored on a majority, given what each peer matched. The leader's own log
/// is at least as long as any peer's, so it always sits at the tail.
fn get_cluster_commit_index(mut peers_matched_indexes: Vec<Option<Index>>) -> Option<Index> {
    peers_matched_indexes.sort_by_key(|matched| match matched {
        None => 0u64,
        Some(m) => m.as_u64(),
    });

    // Overview of why algo is correct:
    // 1. add "me": cluster_size = peers + 1
    // 2. majority = (cluster_size / 2) + 1
    // 3. subtract "me": num_peers_to_achieve_majority = majority - 1
    // 4. take the `num_peers_to_achieve_majority`th index from the right
    //
    // Which simplifies to `peers / 2`. When in doubt, just read the unit tests.
    let quorum_idx = peers_matched_indexes.len() / 2;

    if quorum_idx < peers_matched_indexes.len() {
        peers_matched_indexes.remove(quorum_idx)
    } else {
        None
    }
}
