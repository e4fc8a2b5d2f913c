use crate::commitlog::Index;
use crate::replica::Term;
use bytes::Bytes;
use tokio::sync::mpsc;

/// An application entry that is committed and applied, in log order.
#[derive(Debug)]
pub(crate) struct CommittedEntry {
    pub(crate) term: Term,
    pub(crate) index: Index,
    pub(crate) data: Bytes,
}

/// Unbounded: the actor must never block on a slow application.
pub(super) fn new() -> (CommitStreamPublisher, CommitStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    (CommitStreamPublisher { tx }, CommitStream { rx })
}

pub(crate) struct CommitStreamPublisher {
    tx: mpsc::UnboundedSender<CommittedEntry>,
}

impl CommitStreamPublisher {
    pub(super) fn notify_commit(&self, logger: &slog::Logger, term: Term, index: Index, data: Bytes) {
        // Applying continues without a reader: the entry is durable in the log either way.
        if self.tx.send(CommittedEntry { term, index, data }).is_err() {
            slog::debug!(logger, "No commit stream reader for {:?}", index);
        }
    }
}

pub(crate) struct CommitStream {
    rx: mpsc::UnboundedReceiver<CommittedEntry>,
}

impl CommitStream {
    /// `None` once the replica is gone and every published entry was received.
    pub(crate) async fn recv(&mut self) -> Option<CommittedEntry> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_outlive_the_publisher() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let (publisher, mut stream) = new();

        publisher.notify_commit(&logger, Term::new(1), Index::new(3), Bytes::from("c"));
        publisher.notify_commit(&logger, Term::new(2), Index::new(4), Bytes::from("d"));
        drop(publisher);

        let first = stream.recv().await.unwrap();
        assert_eq!((first.term, first.index), (Term::new(1), Index::new(3)));
        assert_eq!(stream.recv().await.unwrap().data, Bytes::from("d"));
        assert!(stream.recv().await.is_none());
    }
}
