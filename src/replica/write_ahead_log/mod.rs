//! This module is a raft-specific commit log that wraps the generic commit log: entry format,
//! commit/apply bookkeeping, the snapshot base and the stream of committed application data.

mod commit_stream;
mod log;
mod log_entry;
mod wiring;

pub(crate) use commit_stream::CommitStream;
pub(crate) use commit_stream::CommittedEntry;
pub use log_entry::EntryPayload;
pub use log_entry::RaftLogEntry;

pub(super) use log::AppliedControl;
pub(super) use log::WriteAheadLog;
pub(super) use wiring::wired;
