use crate::actor::WeakActorClient;
use crate::commitlog::Index;
use crate::peers::ActorId;
use crate::replica::election::timers::{ElectionTimer, HeartbeatTimer};
use crate::replica::election::{ElectionRecord, LeaderStateTracker, LeaseStatus};
use crate::replica::{ReplicaRole, Term};
use std::collections::BTreeSet;
use std::fmt;
use tokio::time::{Duration, Instant};

#[derive(Clone)]
pub(crate) struct ElectionConfig {
    pub(crate) my_id: ActorId,
    pub(crate) leader_heartbeat_duration: Duration,
    pub(crate) follower_min_timeout: Duration,
    pub(crate) follower_max_timeout: Duration,
}

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, terms, peers, etc. or knowing "when" to do something.
pub(crate) struct ElectionState {
    state: State,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    // Last time a leader for our current term reached us. Survives role changes so that a node
    // that just stepped down still counts a live leader when judging prevotes.
    last_leader_contact: Option<Instant>,
}

impl ElectionState {
    /// `new_follower()` creates a new ElectionState instance that starts out as a follower.
    pub(crate) fn new_follower(config: ElectionConfig, actor_client: WeakActorClient, term: Term) -> Self {
        let state = State::Follower(FollowerState::new(None, &config, actor_client.clone(), term));

        ElectionState {
            state,
            config,
            actor_client,
            last_leader_contact: None,
        }
    }

    pub(crate) fn transition_to_follower(&mut self, term: Term, leader: Option<ActorId>) {
        self.state = State::Follower(FollowerState::new(leader, &self.config, self.actor_client.clone(), term));
    }

    /// PreCandidates poll for `term + 1` without persisting anything, so their timer still
    /// belongs to `term`.
    pub(crate) fn transition_to_pre_candidate(&mut self, term: Term, num_voters: usize) {
        self.state = State::PreCandidate(CandidateState::new(
            ElectionRecord::new(term.next(), self.config.my_id, num_voters),
            &self.config,
            self.actor_client.clone(),
            term,
        ));
    }

    pub(crate) fn transition_to_candidate(&mut self, term: Term, num_voters: usize) {
        self.state = State::Candidate(CandidateState::new(
            ElectionRecord::new(term, self.config.my_id, num_voters),
            &self.config,
            self.actor_client.clone(),
            term,
        ));
    }

    pub(crate) fn transition_to_leader(
        &mut self,
        term: Term,
        peer_ids: &BTreeSet<ActorId>,
        previous_log_entry_index: Option<Index>,
    ) {
        self.state = State::Leader(LeaderState {
            tracker: LeaderStateTracker::new(peer_ids, previous_log_entry_index),
            lease: LeaseStatus::new(),
            timer: HeartbeatTimer::start(self.config.leader_heartbeat_duration, self.actor_client.clone(), term),
        });
    }

    pub(crate) fn role(&self) -> ReplicaRole {
        match &self.state {
            State::Leader(_) => ReplicaRole::Leader,
            State::Candidate(_) => ReplicaRole::Candidate,
            State::PreCandidate(_) => ReplicaRole::PreCandidate,
            State::Follower(_) => ReplicaRole::Follower,
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        matches!(self.state, State::Leader(_))
    }

    /// The leader of the current term as far as we know, which is us if we are leader.
    pub(crate) fn leader(&self) -> Option<ActorId> {
        match &self.state {
            State::Leader(_) => Some(self.config.my_id),
            State::Follower(fs) => fs.leader,
            State::Candidate(_) | State::PreCandidate(_) => None,
        }
    }

    pub(crate) fn reset_timeout_if_follower(&self) {
        if let State::Follower(fs) = &self.state {
            fs.election_timer.postpone();
        }
    }

    pub(crate) fn set_leader_if_unknown(&mut self, leader: ActorId) {
        if let State::Follower(fs) = &mut self.state {
            if fs.leader.is_none() {
                fs.leader.replace(leader);
            }
        }
    }

    pub(crate) fn record_leader_contact(&mut self, now: Instant) {
        self.last_leader_contact.replace(now);
    }

    pub(crate) fn heard_from_leader_within(&self, window: Duration, now: Instant) -> bool {
        match self.last_leader_contact {
            Some(contact) => now.saturating_duration_since(contact) < window,
            None => false,
        }
    }

    pub(crate) fn pre_candidate_record_mut(&mut self) -> Option<&mut ElectionRecord> {
        match &mut self.state {
            State::PreCandidate(cs) => Some(&mut cs.record),
            _ => None,
        }
    }

    pub(crate) fn candidate_record_mut(&mut self) -> Option<&mut ElectionRecord> {
        match &mut self.state {
            State::Candidate(cs) => Some(&mut cs.record),
            _ => None,
        }
    }

    pub(crate) fn leader_state(&self) -> Option<&LeaderState> {
        match &self.state {
            State::Leader(ls) => Some(ls),
            _ => None,
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderState> {
        match &mut self.state {
            State::Leader(ls) => Some(ls),
            _ => None,
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader"),
            State::Candidate(cs) => write!(f, "Candidate({}/{})", cs.record.granted(), cs.record.majority()),
            State::PreCandidate(cs) => write!(f, "PreCandidate({}/{})", cs.record.granted(), cs.record.majority()),
            State::Follower(FollowerState { leader: Some(leader), .. }) => write!(f, "Follower(Leader={:?})", leader),
            State::Follower(FollowerState { leader: None, .. }) => write!(f, "Follower(Leader=None)"),
        }
    }
}

enum State {
    Leader(LeaderState),
    Candidate(CandidateState),
    PreCandidate(CandidateState),
    Follower(FollowerState),
}

pub(crate) struct LeaderState {
    pub(crate) tracker: LeaderStateTracker,
    pub(crate) lease: LeaseStatus,
    timer: HeartbeatTimer,
}

impl LeaderState {
    pub(crate) fn reset_heartbeat_timer(&self) {
        self.timer.postpone();
    }
}

struct CandidateState {
    record: ElectionRecord,
    _election_timer: ElectionTimer,
}

impl CandidateState {
    fn new(record: ElectionRecord, config: &ElectionConfig, actor_client: WeakActorClient, term: Term) -> Self {
        CandidateState {
            record,
            _election_timer: ElectionTimer::start(
                config.follower_min_timeout,
                config.follower_max_timeout,
                actor_client,
                term,
            ),
        }
    }
}

struct FollowerState {
    leader: Option<ActorId>,
    election_timer: ElectionTimer,
}

impl FollowerState {
    fn new(leader: Option<ActorId>, config: &ElectionConfig, actor_client: WeakActorClient, term: Term) -> Self {
        FollowerState {
            leader,
            election_timer: ElectionTimer::start(
                config.follower_min_timeout,
                config.follower_max_timeout,
                actor_client,
                term,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::replica::LeaderTimerTick;

    fn config() -> ElectionConfig {
        ElectionConfig {
            my_id: ActorId::from(1u64),
            leader_heartbeat_duration: Duration::from_millis(50),
            follower_min_timeout: Duration::from_millis(150),
            follower_max_timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn roles_and_leader_follow_transitions() {
        let (client, _rx) = ActorClient::new(16);
        let mut election = ElectionState::new_follower(config(), client.weak(), Term::new(0));
        assert_eq!(election.role(), ReplicaRole::Follower);
        assert_eq!(election.leader(), None);

        election.set_leader_if_unknown(ActorId::from(3u64));
        election.set_leader_if_unknown(ActorId::from(4u64));
        assert_eq!(election.leader(), Some(ActorId::from(3u64)));

        election.transition_to_pre_candidate(Term::new(0), 3);
        assert_eq!(election.role(), ReplicaRole::PreCandidate);
        assert_eq!(election.pre_candidate_record_mut().unwrap().term(), Term::new(1));
        assert!(election.candidate_record_mut().is_none());
        assert_eq!(election.leader(), None);

        election.transition_to_candidate(Term::new(1), 3);
        assert_eq!(election.candidate_record_mut().unwrap().granted(), 1);

        let peers = vec![ActorId::from(2u64), ActorId::from(3u64)].into_iter().collect();
        election.transition_to_leader(Term::new(1), &peers, None);
        assert!(election.is_leader());
        assert_eq!(election.leader(), Some(ActorId::from(1u64)));
        assert_eq!(election.leader_state().unwrap().tracker.peers_iter().count(), 2);
    }

    #[tokio::test]
    async fn leader_contact_window() {
        let (client, _rx) = ActorClient::new(16);
        let mut election = ElectionState::new_follower(config(), client.weak(), Term::new(0));
        let now = Instant::now();
        let window = Duration::from_millis(150);

        assert!(!election.heard_from_leader_within(window, now));
        election.record_leader_contact(now);
        assert!(election.heard_from_leader_within(window, now + Duration::from_millis(100)));
        assert!(!election.heard_from_leader_within(window, now + window));
    }

    #[tokio::test]
    async fn role_timers_ring_into_the_actor_queue() {
        let (client, mut rx) = ActorClient::new(16);
        let mut election = ElectionState::new_follower(config(), client.weak(), Term::new(0));

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(Event::FollowerTimeout(term)) if term == Term::new(0)));

        let peers = vec![ActorId::from(2u64)].into_iter().collect();
        election.transition_to_leader(Term::new(1), &peers, None);
        election.leader_state().unwrap().reset_heartbeat_timer();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(
            event,
            Some(Event::LeaderTimer(tick)) if tick == LeaderTimerTick { term: Term::new(1) }
        ));
    }
}
