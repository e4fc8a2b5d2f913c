use crate::commitlog::Index;
use crate::mail::codec::{CorruptedDataError, Decode, Encode, Varint};
use crate::mail::SnapshotMetadata;
use crate::peers::{ActorId, ConsensusPeersConfiguration};
use crate::replica::StatusMap;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{fmt, io};

pub(crate) const TERM_KEY: &str = "term";
pub(crate) const VOTE_KEY: &str = "vote";
pub(crate) const LAST_APPLIED_KEY: &str = "lastApplied";
pub(crate) const PEERS_CONFIG_KEY: &str = "peersConfig";
pub(crate) const SNAPSHOT_KEY: &str = "snapshot";

#[derive(Copy, Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Default)]
pub(crate) struct Term(u64);

impl Term {
    pub(crate) const fn new(term: u64) -> Self {
        Term(term)
    }

    pub(crate) fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn next(&self) -> Term {
        Term(self.0 + 1)
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// VoteRecord is the persisted vote. It carries its own term so that a vote left over from an
/// older term is recognizable after a crash between the term write and the vote write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct VoteRecord {
    term: Term,
    candidate: ActorId,
}

impl Encode for VoteRecord {
    fn encode(&self, buf: &mut impl BufMut) {
        self.term.as_u64().encode_varint(buf);
        self.candidate.encode(buf);
    }
}

impl Decode for VoteRecord {
    fn decode(buf: &mut impl Buf) -> Result<Self, CorruptedDataError> {
        Ok(VoteRecord {
            term: Term::new(u64::decode_varint(buf)?),
            candidate: ActorId::decode(buf)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadStateError {
    #[error("failed to read persisted state: {0}")]
    Io(#[from] io::Error),
    #[error("persisted record `{key}` is corrupted: {source}")]
    Corrupted {
        key: &'static str,
        source: CorruptedDataError,
    },
    #[error("persisted vote is for term {vote_term:?}, ahead of persisted term {term:?}")]
    VoteAheadOfTerm { vote_term: u64, term: u64 },
}

/// PersistentLocalState is used whenever raft requires that something is persisted to a durable
/// store to guarantee safety. Every store method persists before it mutates the in-memory view,
/// so an I/O error leaves the in-memory state as it was.
///
/// CAS store methods return `Ok(true)` if they mutated state.
pub(crate) trait PersistentLocalState: Send {
    /// Set current term to `new_term` atomically, iff it is larger than current term. Clears the
    /// vote.
    fn store_term_if_increased(&mut self, new_term: Term) -> Result<bool, io::Error>;

    /// Store our vote for the latest term iff the latest term is the same term as the one
    /// provided, and we have not stored a vote for the latest term.
    fn store_vote_for_term_if_unvoted(&mut self, expected_current_term: Term, vote: ActorId)
        -> Result<bool, io::Error>;

    /// Return the new term. Used when transitioning to candidate.
    fn increment_term_and_vote_for_self(&mut self) -> Result<Term, io::Error>;

    fn current_term(&self) -> Term;
    fn voted_for_current_term(&self) -> (Term, Option<ActorId>);

    fn last_applied(&self) -> Option<Index>;
    fn store_last_applied(&mut self, index: Index) -> Result<(), io::Error>;

    fn peers_configuration(&self) -> &ConsensusPeersConfiguration;
    fn store_peers_configuration(&mut self, config: ConsensusPeersConfiguration) -> Result<(), io::Error>;

    fn snapshot_metadata(&self) -> Option<&SnapshotMetadata>;
    fn store_snapshot_metadata(&mut self, metadata: SnapshotMetadata) -> Result<(), io::Error>;
}

/// DurableLocalState keeps every record in a `StatusMap`.
pub(crate) struct DurableLocalState {
    my_id: ActorId,
    status_map: Box<dyn StatusMap>,
    current_term: Term,
    voted_for_this_term: Option<ActorId>,
    last_applied: Option<Index>,
    peers_config: ConsensusPeersConfiguration,
    snapshot: Option<SnapshotMetadata>,
}

impl DurableLocalState {
    /// Load every record from `status_map`. A missing membership record is initialized from
    /// `initial_members` (plus ourselves) and persisted.
    pub(crate) fn load(
        my_id: ActorId,
        mut status_map: Box<dyn StatusMap>,
        initial_members: impl IntoIterator<Item = ActorId>,
    ) -> Result<Self, LoadStateError> {
        let current_term = read_record::<u64>(&*status_map, TERM_KEY)?
            .map(Term::new)
            .unwrap_or_default();

        let voted_for_this_term = match read_record::<VoteRecord>(&*status_map, VOTE_KEY)? {
            Some(vote) if vote.term == current_term => Some(vote.candidate),
            Some(vote) if vote.term > current_term => {
                return Err(LoadStateError::VoteAheadOfTerm {
                    vote_term: vote.term.as_u64(),
                    term: current_term.as_u64(),
                })
            }
            _ => None,
        };

        let last_applied = read_record::<u64>(&*status_map, LAST_APPLIED_KEY)?.and_then(Index::from_u64);

        let peers_config = match read_record::<ConsensusPeersConfiguration>(&*status_map, PEERS_CONFIG_KEY)? {
            Some(config) => config,
            None => {
                let mut members: Vec<ActorId> = initial_members.into_iter().collect();
                members.push(my_id);
                let config = ConsensusPeersConfiguration::initial(members);
                status_map.put(PEERS_CONFIG_KEY, config.encode_to_bytes())?;
                config
            }
        };

        let snapshot = read_record::<SnapshotMetadata>(&*status_map, SNAPSHOT_KEY)?;

        Ok(DurableLocalState {
            my_id,
            status_map,
            current_term,
            voted_for_this_term,
            last_applied,
            peers_config,
            snapshot,
        })
    }

    fn put_vote(&mut self, term: Term, candidate: ActorId) -> Result<(), io::Error> {
        let record = VoteRecord { term, candidate };
        self.status_map.put(VOTE_KEY, record.encode_to_bytes())
    }
}

fn read_record<T: Decode>(status_map: &dyn StatusMap, key: &'static str) -> Result<Option<T>, LoadStateError> {
    match status_map.get(key)? {
        None => Ok(None),
        Some(bytes) => T::decode_exact(&bytes)
            .map(Some)
            .map_err(|source| LoadStateError::Corrupted { key, source }),
    }
}

fn varint_bytes(value: u64) -> Bytes {
    let mut buf = BytesMut::new();
    value.encode_varint(&mut buf);
    buf.freeze()
}

impl PersistentLocalState for DurableLocalState {
    fn store_term_if_increased(&mut self, new_term: Term) -> Result<bool, io::Error> {
        if new_term <= self.current_term {
            return Ok(false);
        }

        // The stale vote record stays behind; its term no longer matches.
        self.status_map.put(TERM_KEY, varint_bytes(new_term.as_u64()))?;
        self.current_term = new_term;
        self.voted_for_this_term = None;
        Ok(true)
    }

    fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: ActorId) -> Result<bool, io::Error> {
        if expected_term != self.current_term || self.voted_for_this_term.is_some() {
            return Ok(false);
        }

        self.put_vote(expected_term, vote)?;
        self.voted_for_this_term.replace(vote);
        Ok(true)
    }

    fn increment_term_and_vote_for_self(&mut self) -> Result<Term, io::Error> {
        // Term before vote: a crash in between leaves a new term with no vote, which is safe.
        let new_term = self.current_term.next();
        self.status_map.put(TERM_KEY, varint_bytes(new_term.as_u64()))?;
        self.current_term = new_term;
        self.voted_for_this_term = None;

        self.put_vote(new_term, self.my_id)?;
        self.voted_for_this_term.replace(self.my_id);

        Ok(new_term)
    }

    fn current_term(&self) -> Term {
        self.current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<ActorId>) {
        (self.current_term, self.voted_for_this_term)
    }

    fn last_applied(&self) -> Option<Index> {
        self.last_applied
    }

    fn store_last_applied(&mut self, index: Index) -> Result<(), io::Error> {
        self.status_map.put(LAST_APPLIED_KEY, varint_bytes(index.as_u64()))?;
        self.last_applied.replace(index);
        Ok(())
    }

    fn peers_configuration(&self) -> &ConsensusPeersConfiguration {
        &self.peers_config
    }

    fn store_peers_configuration(&mut self, config: ConsensusPeersConfiguration) -> Result<(), io::Error> {
        self.status_map.put(PEERS_CONFIG_KEY, config.encode_to_bytes())?;
        self.peers_config = config;
        Ok(())
    }

    fn snapshot_metadata(&self) -> Option<&SnapshotMetadata> {
        self.snapshot.as_ref()
    }

    fn store_snapshot_metadata(&mut self, metadata: SnapshotMetadata) -> Result<(), io::Error> {
        self.status_map.put(SNAPSHOT_KEY, metadata.encode_to_bytes())?;
        self.snapshot.replace(metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::InMemoryStatusMap;

    fn id(v: u64) -> ActorId {
        ActorId::from(v)
    }

    fn load(map: &InMemoryStatusMap) -> DurableLocalState {
        DurableLocalState::load(id(1), Box::new(map.clone()), vec![id(2), id(3)]).unwrap()
    }

    #[test]
    fn fresh_state_persists_initial_membership() {
        let map = InMemoryStatusMap::new();
        let state = load(&map);

        assert_eq!(state.current_term(), Term::new(0));
        assert_eq!(state.voted_for_current_term(), (Term::new(0), None));
        assert_eq!(state.peers_configuration().members.len(), 3);
        assert!(map.get(PEERS_CONFIG_KEY).unwrap().is_some());
    }

    #[test]
    fn one_vote_per_term_survives_restart() {
        let map = InMemoryStatusMap::new();
        let mut state = load(&map);

        assert!(state.store_term_if_increased(Term::new(5)).unwrap());
        assert!(state.store_vote_for_term_if_unvoted(Term::new(5), id(2)).unwrap());
        assert!(!state.store_vote_for_term_if_unvoted(Term::new(5), id(3)).unwrap());
        drop(state);

        let mut restarted = load(&map);
        assert_eq!(restarted.voted_for_current_term(), (Term::new(5), Some(id(2))));
        assert!(!restarted.store_vote_for_term_if_unvoted(Term::new(5), id(3)).unwrap());
        assert!(!restarted.store_term_if_increased(Term::new(4)).unwrap());
    }

    #[test]
    fn higher_term_clears_vote_even_across_restart() {
        let map = InMemoryStatusMap::new();
        let mut state = load(&map);
        assert_eq!(state.increment_term_and_vote_for_self().unwrap(), Term::new(1));
        assert!(state.store_term_if_increased(Term::new(2)).unwrap());
        drop(state);

        let restarted = load(&map);
        assert_eq!(restarted.voted_for_current_term(), (Term::new(2), None));
    }

    #[test]
    fn corrupted_records_fail_loading() {
        let mut map = InMemoryStatusMap::new();
        map.put(VOTE_KEY, Bytes::from_static(&[0x01, 0xaa])).unwrap();

        let result = DurableLocalState::load(id(1), Box::new(map.clone()), vec![]);
        assert!(matches!(result, Err(LoadStateError::Corrupted { key: VOTE_KEY, .. })));

        let mut map = InMemoryStatusMap::new();
        map.put(PEERS_CONFIG_KEY, Bytes::from_static(&[0x07, 0x03])).unwrap();
        let result = DurableLocalState::load(id(1), Box::new(map), vec![]);
        assert!(matches!(result, Err(LoadStateError::Corrupted { key: PEERS_CONFIG_KEY, .. })));
    }

    #[test]
    fn vote_ahead_of_term_is_rejected() {
        let mut map = InMemoryStatusMap::new();
        let vote = VoteRecord {
            term: Term::new(3),
            candidate: id(2),
        };
        map.put(VOTE_KEY, vote.encode_to_bytes()).unwrap();

        let result = DurableLocalState::load(id(1), Box::new(map), vec![]);
        assert!(matches!(result, Err(LoadStateError::VoteAheadOfTerm { .. })));
    }
}
