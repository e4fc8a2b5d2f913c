use super::Replica;
use crate::commitlog::{Index, Log};
use crate::mail::{Mail, RaftMailBuilder, RaftMessage, VoteRequest, VoteResponse};
use crate::peers::ActorId;
use crate::replica::write_ahead_log::EntryPayload;
use crate::replica::{RaftLogEntry, ReplicaRole, RoundKind, Term};
use std::collections::HashMap;
use std::io;
use tokio::time::Instant;

impl<L> Replica<L>
where
    L: Log<RaftLogEntry> + 'static,
{
    pub(crate) fn handle_follower_timeout(&mut self, term: Term) {
        if self.election_state.is_leader() {
            return;
        }

        let current_term = self.local_state.current_term();
        if term != current_term {
            slog::debug!(
                self.logger,
                "Ignoring timeout for term {:?}, current term: {:?}",
                term,
                current_term
            );
            return;
        }

        slog::info!(self.logger, "Timed out waiting for a leader in term {:?}", current_term);
        self.start_prevote();
    }

    /// Poll the cluster for the next term without touching durable state. Only a majority of
    /// grants moves us on to a real election, so a partitioned node can't inflate everyone's term.
    pub(super) fn start_prevote(&mut self) {
        if !self.is_member(&self.my_id) {
            slog::debug!(self.logger, "Not a voting member, not campaigning");
            return;
        }

        let current_term = self.local_state.current_term();
        self.election_attempt += 1;
        let num_voters = self.num_voters();
        self.election_state
            .transition_to_pre_candidate(current_term, num_voters);
        slog::info!(self.logger, "Starting prevote for term {:?}", current_term.next());

        if self.pre_candidate_has_majority() {
            self.start_election();
            return;
        }

        let request = self.vote_request(current_term.next());
        let mails = self.same_mail_for_all(&RaftMessage::PrevoteRequest(request));
        self.broadcast(RoundKind::Prevote, current_term, self.election_attempt, mails);
    }

    pub(super) fn handle_prevote_request(&mut self, request: VoteRequest) -> VoteResponse {
        let current_term = self.local_state.current_term();
        let granted = self.should_grant_prevote(&request, current_term);
        if granted {
            slog::info!(self.logger, "Granting prevote to {:?}", request.candidate);
        }

        VoteResponse {
            granted,
            term: current_term.as_u64(),
        }
    }

    fn should_grant_prevote(&self, request: &VoteRequest, current_term: Term) -> bool {
        if Term::new(request.term) <= current_term {
            slog::debug!(self.logger, "Not granting prevote. Proposed term is not ahead of ours.");
            return false;
        }
        if !self.is_member(&request.candidate) {
            slog::info!(self.logger, "Not granting prevote. {:?} is not a member.", request.candidate);
            return false;
        }
        if self.election_state.is_leader() {
            return false;
        }
        if self
            .election_state
            .heard_from_leader_within(self.options.follower_min_timeout, Instant::now())
        {
            slog::debug!(self.logger, "Not granting prevote. Our leader is alive.");
            return false;
        }

        self.is_candidate_log_gte_mine(candidate_last_entry(request))
    }

    pub(super) fn handle_prevote_response(&mut self, from: ActorId, response: VoteResponse) {
        match self.observe_term(Term::new(response.term), None) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                slog::error!(self.logger, "Failed to persist observed term: {:?}", e);
                return;
            }
        }

        let won = match self.election_state.pre_candidate_record_mut() {
            Some(record) => {
                record.record(from, response.granted);
                record.has_majority()
            }
            None => return,
        };
        if won {
            self.start_election();
        }
    }

    pub(super) fn prevote_decided(&mut self, round: u64, granted: bool) {
        if self.election_state.role() != ReplicaRole::PreCandidate || round != self.election_attempt {
            return;
        }

        if granted {
            self.start_election();
        } else {
            slog::info!(self.logger, "Prevote round {} failed, back to follower", round);
            let current_term = self.local_state.current_term();
            self.become_follower(current_term, None);
        }
    }

    fn start_election(&mut self) {
        let term = match self.local_state.increment_term_and_vote_for_self() {
            Ok(term) => term,
            Err(e) => {
                slog::error!(self.logger, "Failed to start election: {:?}", e);
                let current_term = self.local_state.current_term();
                self.become_follower(current_term, None);
                return;
            }
        };

        self.election_attempt += 1;
        let num_voters = self.num_voters();
        self.election_state.transition_to_candidate(term, num_voters);
        slog::info!(self.logger, "Starting election for term {:?}", term);

        let won = self
            .election_state
            .candidate_record_mut()
            .map(|record| record.has_majority())
            .unwrap_or(false);
        if won {
            self.become_leader();
            return;
        }

        let request = self.vote_request(term);
        let mails = self.same_mail_for_all(&RaftMessage::VoteRequest(request));
        self.broadcast(RoundKind::Vote, term, self.election_attempt, mails);
    }

    pub(super) fn handle_vote_request(&mut self, request: VoteRequest) -> VoteResponse {
        let granted = match self.decide_vote(&request) {
            Ok(granted) => granted,
            Err(e) => {
                slog::error!(self.logger, "Failed to persist vote state: {:?}", e);
                false
            }
        };

        VoteResponse {
            granted,
            term: self.local_state.current_term().as_u64(),
        }
    }

    fn decide_vote(&mut self, request: &VoteRequest) -> Result<bool, io::Error> {
        if !self.is_member(&request.candidate) {
            slog::info!(self.logger, "Not granting vote. {:?} is not a member.", request.candidate);
            return Ok(false);
        }

        // Read our local term/vote state as 1 atomic action.
        let (current_term, mut opt_voted_for) = self.local_state.voted_for_current_term();
        let candidate_term = Term::new(request.term);

        // 1. Reply false if term < currentTerm (§5.1)
        if candidate_term < current_term {
            slog::info!(self.logger, "Not granting vote. Candidate term is out of date.");
            return Ok(false);
        }

        // > If RPC request or response contains term T > currentTerm:
        // > set currentTerm = T, convert to follower (§5.1)
        if self.observe_term(candidate_term, None)? {
            opt_voted_for = None;
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        if let Some(voted_for) = opt_voted_for {
            if voted_for != request.candidate {
                slog::info!(self.logger, "Not granting vote. We already voted for {:?}.", voted_for);
                return Ok(false);
            }
        }

        if !self.is_candidate_log_gte_mine(candidate_last_entry(request)) {
            slog::info!(self.logger, "Not granting vote. Candidate log is out of date.");
            return Ok(false);
        }

        slog::info!(self.logger, "Voting for {:?}.", request.candidate);
        if self
            .local_state
            .store_vote_for_term_if_unvoted(candidate_term, request.candidate)?
        {
            self.election_state.reset_timeout_if_follower();
            return Ok(true);
        }

        // Lost the CAS: only grant if the recorded vote is the one we would have made. This is
        // the retried request case.
        if let (reread_term, Some(reread_voted_for)) = self.local_state.voted_for_current_term() {
            if reread_term == candidate_term && reread_voted_for == request.candidate {
                self.election_state.reset_timeout_if_follower();
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub(super) fn handle_vote_response(&mut self, from: ActorId, response: VoteResponse) {
        let term = Term::new(response.term);
        match self.observe_term(term, None) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                slog::error!(self.logger, "Failed to persist observed term: {:?}", e);
                return;
            }
        }
        if term != self.local_state.current_term() {
            return;
        }

        let won = match self.election_state.candidate_record_mut() {
            Some(record) => {
                record.record(from, response.granted);
                record.has_majority()
            }
            None => return,
        };
        if won {
            self.become_leader();
        }
    }

    pub(super) fn vote_decided(&mut self, round: u64, granted: bool) {
        if self.election_state.role() != ReplicaRole::Candidate || round != self.election_attempt {
            return;
        }

        if granted {
            self.become_leader();
        } else {
            slog::info!(
                self.logger,
                "Election round {} lost or split, waiting for the next timeout",
                round
            );
        }
    }

    fn become_leader(&mut self) {
        let term = self.local_state.current_term();
        let peer_ids = self.quorum.ids();
        self.election_state
            .transition_to_leader(term, &peer_ids, self.wal.latest_index());
        slog::info!(self.logger, "Became leader of term {:?}", term);

        self.recover_pending_membership();

        // Entries of earlier terms only commit through an entry of our own term.
        if let Err(e) = self.wal.append(RaftLogEntry {
            term,
            payload: EntryPayload::Noop,
        }) {
            slog::error!(self.logger, "Failed to append leader noop: {:?}", e);
        }
    }

    // A membership entry we inherited unapplied still blocks the next change.
    fn recover_pending_membership(&mut self) {
        let latest = match self.wal.latest_index() {
            Some(latest) => latest,
            None => return,
        };
        let mut index = match self.wal.last_applied_index() {
            Some(applied) => applied.plus(1),
            None => Index::start_index(),
        };

        while index <= latest {
            match self.wal.read(index) {
                Ok(Some(entry)) if entry.payload.is_membership_change() => {
                    self.membership.set_pending(index, entry.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    slog::error!(self.logger, "Failed to read {:?} while recovering membership: {:?}", index, e);
                    return;
                }
            }
            index = index.plus(1);
        }
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_entry: Option<(Term, Index)>) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        match (self.wal.latest_entry(), candidate_last_entry) {
            (None, None) => true,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (Some((my_last_term, my_last_index)), Some((candidate_last_term, candidate_last_index))) => {
                if candidate_last_term > my_last_term {
                    return true;
                } else if candidate_last_term < my_last_term {
                    return false;
                }

                candidate_last_index >= my_last_index
            }
        }
    }

    fn pre_candidate_has_majority(&mut self) -> bool {
        self.election_state
            .pre_candidate_record_mut()
            .map(|record| record.has_majority())
            .unwrap_or(false)
    }

    fn vote_request(&self, term: Term) -> VoteRequest {
        let (last_log_term, last_log_index) = match self.wal.latest_entry() {
            None => (0, 0),
            Some((term, index)) => (term.as_u64(), index.as_u64()),
        };

        VoteRequest {
            term: term.as_u64(),
            candidate: self.my_id,
            last_log_index,
            last_log_term,
        }
    }

    fn same_mail_for_all(&self, message: &RaftMessage) -> HashMap<ActorId, Mail> {
        let mail = RaftMailBuilder::build(message);
        self.quorum.ids().into_iter().map(|id| (id, mail.clone())).collect()
    }
}

fn candidate_last_entry(request: &VoteRequest) -> Option<(Term, Index)> {
    Index::from_u64(request.last_log_index).map(|index| (Term::new(request.last_log_term), index))
}
