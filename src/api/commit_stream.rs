use crate::replica;
use bytes::Bytes;

/// RaftCommitStream yields application entries in log order as they commit on this replica.
/// Noop and membership entries are consumed by the consensus and never show up here.
pub struct RaftCommitStream {
    stream: replica::CommitStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftCommittedEntry {
    pub term: u64,
    pub index: u64,
    pub data: Bytes,
}

impl RaftCommitStream {
    pub(crate) fn new(stream: replica::CommitStream) -> Self {
        RaftCommitStream { stream }
    }

    /// next returns the next committed entry to be applied to your application's state machine,
    /// or `None` once the replica has exited and every committed entry was drained.
    pub async fn next(&mut self) -> Option<RaftCommittedEntry> {
        self.stream.recv().await.map(RaftCommittedEntry::from)
    }
}

impl From<replica::CommittedEntry> for RaftCommittedEntry {
    fn from(entry: replica::CommittedEntry) -> Self {
        RaftCommittedEntry {
            term: entry.term.as_u64(),
            index: entry.index.as_u64(),
            data: entry.data,
        }
    }
}
