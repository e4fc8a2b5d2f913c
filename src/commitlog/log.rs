use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Index is an index of an entry in the log; i.e. a log entry's index.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Index(U64NonZero);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(U64NonZero::new(index))
    }

    pub fn new_usize(index: usize) -> Self {
        Self::new(index as u64)
    }

    /// Wire and status encodings use 0 for "no index".
    pub fn from_u64(index: u64) -> Option<Self> {
        if index == 0 {
            None
        } else {
            Some(Self::new(index))
        }
    }

    pub fn start_index() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub fn plus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.as_u64().checked_sub(delta).and_then(Index::from_u64)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// `opt_index_u64` flattens an optional index into its wire value.
pub fn opt_index_u64(index: Option<Index>) -> u64 {
    index.map(|i| i.as_u64()).unwrap_or(0)
}

/// Log is an append only log intended for use as a replicated commit log in a database.
///
/// Log indexes entries starting from 1. There will be no entry existing at index 0. The first
/// entry is written at index 1. A prefix of the log may be compacted away with `drop_until()`,
/// after which `first_index()` moves past the dropped entries.
pub trait Log<E: Entry>: Send {
    /// append() appends a log entry to the log at the next log entry index, then returns
    /// the log entry index that was just used to append the entry.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read log entry at specified index. Compacted and not-yet-written indexes read as `None`.
    fn read(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Soft-deletes anything starting at `index` and later. Soft-deletion makes this infallible.
    fn truncate(&mut self, index: Index);

    /// Drop every entry up to and including `index`. If `index` is past the end of the log, the
    /// log becomes empty and the next append lands at `index + 1`.
    fn drop_until(&mut self, index: Index);

    /// first_index returns the lowest index still readable, or `next_index()` if empty.
    fn first_index(&self) -> Index;

    /// next_index returns the next index that will be used to append an entry.
    fn next_index(&self) -> Index;

    fn size_in_entries(&self) -> usize {
        (self.next_index().as_u64() - self.first_index().as_u64()) as usize
    }
}

/// Entry is the unit stored by a `Log`. The conversion to bytes is exercised by every log impl,
/// even in memory, so a corrupted record surfaces as `io::ErrorKind::InvalidData` on read.
pub trait Entry: Clone + Sized {
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, io::Error>;
}
