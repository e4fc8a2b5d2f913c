use crate::mail::SnapshotMetadata;
use bytes::{Bytes, BytesMut};
use std::io;
use std::sync::{Arc, Mutex};

/// SnapshotStore is the application side of log compaction. The consensus decides when a
/// snapshot is taken and installed; the store decides what the bytes are.
pub trait SnapshotStore: Send {
    /// Capture state covering every entry up to and including `metadata.last_index`.
    fn create(&mut self, metadata: &SnapshotMetadata) -> Result<Bytes, io::Error>;

    /// The most recently created or installed snapshot.
    fn latest(&self) -> Result<Option<(SnapshotMetadata, Bytes)>, io::Error>;

    /// Replace local state with a snapshot streamed from the leader.
    fn install(&mut self, metadata: &SnapshotMetadata, data: Bytes) -> Result<(), io::Error>;
}

/// InMemorySnapshotStore snapshots whatever state the application last handed to `set_state()`.
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    inner: Arc<Mutex<InMemorySnapshots>>,
}

#[derive(Default)]
struct InMemorySnapshots {
    state: Bytes,
    latest: Option<(SnapshotMetadata, Bytes)>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        InMemorySnapshotStore::default()
    }

    pub fn set_state(&self, state: Bytes) {
        self.inner.lock().expect("InMemorySnapshotStore mutex guard poison").state = state;
    }

    pub fn state(&self) -> Bytes {
        self.inner.lock().expect("InMemorySnapshotStore mutex guard poison").state.clone()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn create(&mut self, metadata: &SnapshotMetadata) -> Result<Bytes, io::Error> {
        let mut inner = self.inner.lock().expect("InMemorySnapshotStore mutex guard poison");
        let data = inner.state.clone();
        inner.latest = Some((metadata.clone(), data.clone()));
        Ok(data)
    }

    fn latest(&self) -> Result<Option<(SnapshotMetadata, Bytes)>, io::Error> {
        Ok(self.inner.lock().expect("InMemorySnapshotStore mutex guard poison").latest.clone())
    }

    fn install(&mut self, metadata: &SnapshotMetadata, data: Bytes) -> Result<(), io::Error> {
        let mut inner = self.inner.lock().expect("InMemorySnapshotStore mutex guard poison");
        inner.state = data.clone();
        inner.latest = Some((metadata.clone(), data));
        Ok(())
    }
}

/// One chunk of a snapshot transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SnapshotChunk {
    pub(crate) offset: u64,
    pub(crate) last: bool,
    pub(crate) data: Bytes,
}

/// SnapshotCursor is the leader's progress streaming one snapshot to one peer.
pub(crate) struct SnapshotCursor {
    metadata: SnapshotMetadata,
    data: Bytes,
    offset: usize,
    in_flight: Option<SentChunk>,
}

#[derive(Debug, Copy, Clone)]
struct SentChunk {
    round: u64,
    end: usize,
    last: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CursorProgress {
    InProgress,
    Installed,
}

impl SnapshotCursor {
    pub(crate) fn new(metadata: SnapshotMetadata, data: Bytes) -> Self {
        SnapshotCursor {
            metadata,
            data,
            offset: 0,
            in_flight: None,
        }
    }

    pub(crate) fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    /// The chunk to send in `round`. Unacknowledged chunks are resent from the same offset.
    pub(crate) fn next_chunk(&mut self, round: u64, chunk_size: usize) -> SnapshotChunk {
        let end = std::cmp::min(self.offset + chunk_size, self.data.len());
        let last = end == self.data.len();
        self.in_flight = Some(SentChunk { round, end, last });

        SnapshotChunk {
            offset: self.offset as u64,
            last,
            data: self.data.slice(self.offset..end),
        }
    }

    /// Fold in the peer's reply to the chunk sent in `round`. A rejected chunk restarts the
    /// transfer from offset 0.
    pub(crate) fn acknowledge(&mut self, round: u64, accepted: bool) -> CursorProgress {
        let sent = match self.in_flight {
            Some(sent) if sent.round == round => sent,
            _ => return CursorProgress::InProgress,
        };
        self.in_flight = None;

        if !accepted {
            self.offset = 0;
            return CursorProgress::InProgress;
        }

        self.offset = sent.end;
        if sent.last {
            CursorProgress::Installed
        } else {
            CursorProgress::InProgress
        }
    }
}

/// SnapshotReceiver reassembles the chunks of one snapshot on the follower side. Chunks must
/// arrive in offset order; a resent chunk that is already buffered is acknowledged and ignored.
#[derive(Default)]
pub(crate) struct SnapshotReceiver {
    transfer: Option<Transfer>,
}

struct Transfer {
    metadata: SnapshotMetadata,
    buffer: BytesMut,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkOutcome {
    Accepted,
    Duplicate,
    Rejected,
    Complete(SnapshotMetadata, Bytes),
}

impl SnapshotReceiver {
    pub(crate) fn receive(&mut self, metadata: &SnapshotMetadata, chunk: SnapshotChunk) -> ChunkOutcome {
        if chunk.offset == 0 {
            self.transfer = Some(Transfer {
                metadata: metadata.clone(),
                buffer: BytesMut::new(),
            });
        }

        let transfer = match self.transfer.as_mut() {
            Some(transfer) if &transfer.metadata == metadata => transfer,
            _ => return ChunkOutcome::Rejected,
        };

        let expected = transfer.buffer.len() as u64;
        let chunk_end = chunk.offset + chunk.data.len() as u64;
        if chunk.offset != expected {
            if chunk.offset > 0 && chunk_end <= expected {
                return ChunkOutcome::Duplicate;
            }
            return ChunkOutcome::Rejected;
        }

        transfer.buffer.extend_from_slice(&chunk.data);
        if !chunk.last {
            return ChunkOutcome::Accepted;
        }

        match self.transfer.take() {
            Some(done) => ChunkOutcome::Complete(done.metadata, done.buffer.freeze()),
            None => ChunkOutcome::Rejected,
        }
    }

    pub(crate) fn abandon(&mut self) {
        self.transfer = None;
    }
}
