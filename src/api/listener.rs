use crate::api::types::ConsensusState;
use crate::replica;

/// ConsensusListener observes role, term, leader, commit index and epoch changes of the local
/// replica.
#[derive(Clone)]
pub struct ConsensusListener {
    listener: replica::ConsensusStateListener,
}

impl ConsensusListener {
    pub(crate) fn new(listener: replica::ConsensusStateListener) -> Self {
        ConsensusListener { listener }
    }

    /// Wait for the next change. Changes that happen between two calls collapse into the latest
    /// one. Returns `None` once the replica has exited.
    pub async fn wait_next_consensus(&mut self) -> Option<ConsensusState> {
        self.listener.next().await.map(ConsensusState::from)
    }

    pub fn current(&self) -> ConsensusState {
        ConsensusState::from(self.listener.current())
    }
}
