use crate::actor::Event;
use crate::replica::{LeaderTimerTick, Term};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// EventRecorder stands in for the replica actor and checks what timers sent it.
pub(super) struct EventRecorder {
    rx: mpsc::Receiver<Event>,
}

impl EventRecorder {
    pub(super) fn new(rx: mpsc::Receiver<Event>) -> Self {
        EventRecorder { rx }
    }

    async fn next(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("No event within 5s")
            .expect("Actor queue closed")
    }

    pub(super) async fn expect_election_timeout(&mut self, expected: Term) {
        match self.next().await {
            Event::FollowerTimeout(term) => assert_eq!(term, expected),
            other => panic!("Expected election timeout, got {:?}", other),
        }
    }

    pub(super) async fn expect_heartbeat(&mut self, expected: Term) {
        match self.next().await {
            Event::LeaderTimer(tick) => assert_eq!(tick, LeaderTimerTick { term: expected }),
            other => panic!("Expected heartbeat tick, got {:?}", other),
        }
    }

    /// Timers run on the real runtime even with a manual clock, so give them a moment.
    pub(super) async fn expect_silence(&mut self) {
        if let Ok(event) = tokio::time::timeout(Duration::from_millis(20), self.rx.recv()).await {
            panic!("Expected no event, got {:?}", event);
        }
    }
}
