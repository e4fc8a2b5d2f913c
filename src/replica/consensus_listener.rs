use crate::commitlog::Index;
use crate::peers::ActorId;
use crate::replica::{ReplicaRole, Term};
use tokio::sync::watch;

/// What an observer sees of the consensus: who leads which term, and how far the log committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ConsensusSnapshot {
    pub(crate) role: ReplicaRole,
    pub(crate) term: Term,
    pub(crate) leader: Option<ActorId>,
    pub(crate) commit_index: Option<Index>,
    pub(crate) epoch: u64,
}

pub(crate) fn new(initial: ConsensusSnapshot) -> (ConsensusStateNotifier, ConsensusStateListener) {
    let (snd, rcv) = watch::channel(initial);

    (ConsensusStateNotifier { snd }, ConsensusStateListener { rcv })
}

pub(crate) struct ConsensusStateNotifier {
    snd: watch::Sender<ConsensusSnapshot>,
}

impl ConsensusStateNotifier {
    /// Publish `snapshot` unless observers already saw an identical one.
    pub(crate) fn notify_if_changed(&self, snapshot: ConsensusSnapshot) {
        if *self.snd.borrow() != snapshot {
            self.snd.send_replace(snapshot);
        }
    }
}

#[derive(Clone)]
pub(crate) struct ConsensusStateListener {
    rcv: watch::Receiver<ConsensusSnapshot>,
}

impl ConsensusStateListener {
    /// Intermediate states between two calls are clobbered into the most recent one. Returns
    /// `None` once the replica is gone.
    pub(crate) async fn next(&mut self) -> Option<ConsensusSnapshot> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }

    pub(crate) fn current(&self) -> ConsensusSnapshot {
        self.rcv.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(role: ReplicaRole, term: u64) -> ConsensusSnapshot {
        ConsensusSnapshot {
            role,
            term: Term::new(term),
            leader: None,
            commit_index: None,
            epoch: 0,
        }
    }

    #[tokio::test]
    async fn identical_states_are_not_republished() {
        let (notifier, mut listener) = new(snapshot(ReplicaRole::Follower, 0));

        notifier.notify_if_changed(snapshot(ReplicaRole::Follower, 0));
        notifier.notify_if_changed(snapshot(ReplicaRole::Candidate, 1));
        notifier.notify_if_changed(snapshot(ReplicaRole::Leader, 1));

        assert_eq!(listener.next().await, Some(snapshot(ReplicaRole::Leader, 1)));

        drop(notifier);
        assert_eq!(listener.next().await, None);
        assert_eq!(listener.current(), snapshot(ReplicaRole::Leader, 1));
    }
}
