use crate::mail::codec::{self, Decode, Encode, Varint};
use crate::peers::{ActorId, ConsensusPeersConfiguration};
use bytes::{Buf, BufMut, Bytes};

/// Vote and prevote requests share a layout. A prevote carries the term the candidate *would*
/// campaign in; nothing about it is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate: ActorId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteResponse {
    pub granted: bool,
    pub term: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireEntry {
    pub term: u64,
    pub payload: Bytes,
}

/// HeartbeatRequest doubles as the append-entries request; an empty `entries` is a pure
/// heartbeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub term: u64,
    pub leader: ActorId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<WireEntry>,
    pub leader_commit: u64,
    pub lease_round: u64,
}

/// On success `match_index` is the last index known to match the leader. On failure it is a hint:
/// the follower's last log index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub success: bool,
    pub term: u64,
    pub match_index: u64,
    pub lease_round: u64,
}

/// SnapshotMetadata travels inside snapshot requests and is also persisted locally, next to the
/// term and vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub last_index: u64,
    pub last_term: u64,
    pub peers: ConsensusPeersConfiguration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub term: u64,
    pub leader: ActorId,
    pub offset: u64,
    pub last: bool,
    pub metadata: SnapshotMetadata,
    pub data: Bytes,
    pub lease_round: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotResponse {
    pub status: bool,
    pub term: u64,
    pub peers_epoch: u64,
    pub lease_round: u64,
}

impl Encode for SnapshotMetadata {
    fn encode(&self, buf: &mut impl BufMut) {
        self.last_index.encode_varint(buf);
        self.last_term.encode_varint(buf);
        self.peers.encode(buf);
    }
}

impl Decode for SnapshotMetadata {
    fn decode(buf: &mut impl Buf) -> codec::Result<Self> {
        Ok(SnapshotMetadata {
            last_index: u64::decode_varint(buf)?,
            last_term: u64::decode_varint(buf)?,
            peers: ConsensusPeersConfiguration::decode(buf)?,
        })
    }
}
