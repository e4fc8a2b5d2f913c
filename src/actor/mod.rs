mod client;

use crate::commitlog::{Index, Log};
use crate::mail::Mail;
use crate::peers::ActorId;
use crate::replica;
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

pub(crate) use client::ActorClient;
pub(crate) use client::ActorExited;
pub(crate) use client::WeakActorClient;

// Disk interaction is synchronous, on the actor task. The actor is the only writer of the log
// and of the local state, so durable order is the order events are handled in.
#[derive(Debug)]
pub(crate) enum Event {
    // Leader: append the batch and start a round. The callback resolves once the batch commits.
    // Candidate/Follower: reject with the known leader.
    Write(
        replica::WriteLogsInput,
        Callback<replica::WriteLogsOutput, replica::WriteLogsError>,
    ),

    // An inbound request mail from a peer. The reply mail goes back on the oneshot.
    GenerateResponse(Mail, oneshot::Sender<Mail>),

    // A reply mail to one of our own broadcasts.
    ReceiveMail { from: ActorId, mail: Mail },

    // Application driven tick. Leader: heartbeat round. Others: prevote if the leader went quiet.
    Advance,

    // Follower/Candidate timer expired for the given term.
    FollowerTimeout(replica::Term),

    // Leader: start a heartbeat round.
    LeaderTimer(replica::LeaderTimerTick),

    // A broadcast round reached (or can no longer reach) a majority.
    QuorumDecided(replica::QuorumDecided),

    PreparePeers(Callback<replica::ConsensusChangeResult, replica::PeersChangeError>),
    ConfiguratePeers(
        replica::ConfiguratePeersInput,
        Callback<replica::ConsensusChangeResult, replica::PeersChangeError>,
    ),
    AbortPeers(Callback<replica::ConsensusChangeResult, replica::PeersChangeError>),

    DropLogsUntil(Index, Callback<(), replica::DropLogsError>),
    LeaseRead(Callback<replica::LeaseReadOutput, replica::LeaseReadError>),
    Status(oneshot::Sender<replica::ReplicaStatus>),
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L>
where
    L: Log<replica::RaftLogEntry>,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: replica::Replica<L>,
}

impl<L> ReplicaActor<L>
where
    L: Log<replica::RaftLogEntry> + 'static,
{
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: replica::Replica<L>) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
        }
        slog::info!(self.logger, "Every client has dropped, replica event loop exits.");
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and/or come back as an event to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Write(input, callback) => {
                self.replica.handle_write(input, callback);
            }
            Event::GenerateResponse(mail, reply_tx) => {
                let reply = self.replica.generate_response(mail);
                let _ = reply_tx.send(reply);
            }
            Event::ReceiveMail { from, mail } => {
                self.replica.receive_mail(from, mail);
            }
            Event::Advance => {
                self.replica.advance();
            }
            Event::FollowerTimeout(term) => {
                self.replica.handle_follower_timeout(term);
            }
            Event::LeaderTimer(tick) => {
                self.replica.handle_leader_timer(tick);
            }
            Event::QuorumDecided(decided) => {
                self.replica.handle_quorum_decided(decided);
            }
            // Membership changes that get appended keep their callback in the replica until the
            // entry applies.
            Event::PreparePeers(callback) => {
                self.replica.prepare_peers_changes(callback);
            }
            Event::ConfiguratePeers(input, callback) => {
                self.replica.configurate_peers(input, callback);
            }
            Event::AbortPeers(callback) => {
                self.replica.abort_peers_changes(callback);
            }
            Event::DropLogsUntil(index, callback) => {
                callback.send(self.replica.drop_logs_until(index));
            }
            Event::LeaseRead(callback) => {
                callback.send(self.replica.lease_read());
            }
            Event::Status(reply_tx) => {
                let _ = reply_tx.send(self.replica.status());
            }
        }

        self.replica.publish_state();
    }
}
