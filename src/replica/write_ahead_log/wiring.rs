use crate::commitlog;
use crate::replica::write_ahead_log::{commit_stream, CommitStream, RaftLogEntry, WriteAheadLog};
use crate::replica::Term;
use crate::commitlog::Index;
use std::io;

pub(in super::super) fn wired<L>(
    logger: slog::Logger,
    log: L,
    snapshot_base: Option<(Term, Index)>,
    last_applied: Option<Index>,
) -> Result<(WriteAheadLog<L>, CommitStream), io::Error>
where
    L: commitlog::Log<RaftLogEntry>,
{
    let (publisher, stream) = commit_stream::new();

    let wal = WriteAheadLog::new(logger, log, publisher, snapshot_base, last_applied)?;

    Ok((wal, stream))
}
