//! Protobuf schema of consensus mail bodies, and the conversions between it and the typed
//! messages. Counters are `uint64`, payloads and actor ids are `bytes`.
use crate::mail::codec::CorruptedDataError;
use crate::mail::messages;
use crate::peers::{ActorId, ConsensusPeersConfiguration};
use bytes::Bytes;
use prost::Message;
use std::convert::TryFrom;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct VoteRequest {
    #[prost(uint64, tag = "1")]
    term: u64,
    #[prost(bytes = "bytes", tag = "2")]
    candidate: Bytes,
    #[prost(uint64, tag = "3")]
    last_log_index: u64,
    #[prost(uint64, tag = "4")]
    last_log_term: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct VoteResponse {
    #[prost(bool, tag = "1")]
    granted: bool,
    #[prost(uint64, tag = "2")]
    term: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct WireEntry {
    #[prost(uint64, tag = "1")]
    term: u64,
    #[prost(bytes = "bytes", tag = "2")]
    payload: Bytes,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct HeartbeatRequest {
    #[prost(uint64, tag = "1")]
    term: u64,
    #[prost(bytes = "bytes", tag = "2")]
    leader: Bytes,
    #[prost(uint64, tag = "3")]
    prev_log_index: u64,
    #[prost(uint64, tag = "4")]
    prev_log_term: u64,
    #[prost(message, repeated, tag = "5")]
    entries: Vec<WireEntry>,
    #[prost(uint64, tag = "6")]
    leader_commit: u64,
    #[prost(uint64, tag = "7")]
    lease_round: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct HeartbeatResponse {
    #[prost(bool, tag = "1")]
    success: bool,
    #[prost(uint64, tag = "2")]
    term: u64,
    #[prost(uint64, tag = "3")]
    match_index: u64,
    #[prost(uint64, tag = "4")]
    lease_round: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct PeersConfiguration {
    #[prost(uint64, tag = "1")]
    epoch: u64,
    #[prost(bytes = "bytes", repeated, tag = "2")]
    members: Vec<Bytes>,
    #[prost(bool, tag = "3")]
    locked: bool,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SnapshotMetadata {
    #[prost(uint64, tag = "1")]
    last_index: u64,
    #[prost(uint64, tag = "2")]
    last_term: u64,
    #[prost(message, optional, tag = "3")]
    peers: Option<PeersConfiguration>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SnapshotRequest {
    #[prost(uint64, tag = "1")]
    term: u64,
    #[prost(bytes = "bytes", tag = "2")]
    leader: Bytes,
    #[prost(uint64, tag = "3")]
    offset: u64,
    #[prost(bool, tag = "4")]
    last: bool,
    #[prost(message, optional, tag = "5")]
    metadata: Option<SnapshotMetadata>,
    #[prost(bytes = "bytes", tag = "6")]
    data: Bytes,
    #[prost(uint64, tag = "7")]
    lease_round: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SnapshotResponse {
    #[prost(bool, tag = "1")]
    status: bool,
    #[prost(uint64, tag = "2")]
    term: u64,
    #[prost(uint64, tag = "3")]
    peers_epoch: u64,
    #[prost(uint64, tag = "4")]
    lease_round: u64,
}

/// Encode a typed message through its protobuf form.
pub(crate) fn encode<'a, T, P>(message: &'a T) -> Bytes
where
    P: Message + From<&'a T>,
{
    Bytes::from(P::from(message).encode_to_vec())
}

/// Decode a whole mail body into a typed message.
pub(crate) fn decode<P, T>(content: &[u8]) -> Result<T, CorruptedDataError>
where
    P: Message + Default,
    T: TryFrom<P, Error = CorruptedDataError>,
{
    let proto = P::decode(content)?;
    T::try_from(proto)
}

fn actor_id(bytes: &[u8]) -> Result<ActorId, CorruptedDataError> {
    ActorId::try_from(bytes)
}

fn actor_id_bytes(id: &ActorId) -> Bytes {
    Bytes::copy_from_slice(id.as_bytes())
}

// ------- Conversions --------

impl From<&messages::VoteRequest> for VoteRequest {
    fn from(m: &messages::VoteRequest) -> Self {
        VoteRequest {
            term: m.term,
            candidate: actor_id_bytes(&m.candidate),
            last_log_index: m.last_log_index,
            last_log_term: m.last_log_term,
        }
    }
}

impl TryFrom<VoteRequest> for messages::VoteRequest {
    type Error = CorruptedDataError;

    fn try_from(p: VoteRequest) -> Result<Self, Self::Error> {
        Ok(messages::VoteRequest {
            term: p.term,
            candidate: actor_id(&p.candidate)?,
            last_log_index: p.last_log_index,
            last_log_term: p.last_log_term,
        })
    }
}

impl From<&messages::VoteResponse> for VoteResponse {
    fn from(m: &messages::VoteResponse) -> Self {
        VoteResponse {
            granted: m.granted,
            term: m.term,
        }
    }
}

impl TryFrom<VoteResponse> for messages::VoteResponse {
    type Error = CorruptedDataError;

    fn try_from(p: VoteResponse) -> Result<Self, Self::Error> {
        Ok(messages::VoteResponse {
            granted: p.granted,
            term: p.term,
        })
    }
}

impl From<&messages::HeartbeatRequest> for HeartbeatRequest {
    fn from(m: &messages::HeartbeatRequest) -> Self {
        HeartbeatRequest {
            term: m.term,
            leader: actor_id_bytes(&m.leader),
            prev_log_index: m.prev_log_index,
            prev_log_term: m.prev_log_term,
            entries: m
                .entries
                .iter()
                .map(|entry| WireEntry {
                    term: entry.term,
                    payload: entry.payload.clone(),
                })
                .collect(),
            leader_commit: m.leader_commit,
            lease_round: m.lease_round,
        }
    }
}

impl TryFrom<HeartbeatRequest> for messages::HeartbeatRequest {
    type Error = CorruptedDataError;

    fn try_from(p: HeartbeatRequest) -> Result<Self, Self::Error> {
        Ok(messages::HeartbeatRequest {
            term: p.term,
            leader: actor_id(&p.leader)?,
            prev_log_index: p.prev_log_index,
            prev_log_term: p.prev_log_term,
            entries: p
                .entries
                .into_iter()
                .map(|entry| messages::WireEntry {
                    term: entry.term,
                    payload: entry.payload,
                })
                .collect(),
            leader_commit: p.leader_commit,
            lease_round: p.lease_round,
        })
    }
}

impl From<&messages::HeartbeatResponse> for HeartbeatResponse {
    fn from(m: &messages::HeartbeatResponse) -> Self {
        HeartbeatResponse {
            success: m.success,
            term: m.term,
            match_index: m.match_index,
            lease_round: m.lease_round,
        }
    }
}

impl TryFrom<HeartbeatResponse> for messages::HeartbeatResponse {
    type Error = CorruptedDataError;

    fn try_from(p: HeartbeatResponse) -> Result<Self, Self::Error> {
        Ok(messages::HeartbeatResponse {
            success: p.success,
            term: p.term,
            match_index: p.match_index,
            lease_round: p.lease_round,
        })
    }
}

impl From<&ConsensusPeersConfiguration> for PeersConfiguration {
    fn from(config: &ConsensusPeersConfiguration) -> Self {
        PeersConfiguration {
            epoch: config.epoch,
            members: config.members.iter().map(actor_id_bytes).collect(),
            locked: config.locked,
        }
    }
}

impl TryFrom<PeersConfiguration> for ConsensusPeersConfiguration {
    type Error = CorruptedDataError;

    fn try_from(p: PeersConfiguration) -> Result<Self, Self::Error> {
        let mut config = ConsensusPeersConfiguration::initial(Vec::new());
        for member in &p.members {
            if !config.members.insert(actor_id(member)?) {
                return Err(CorruptedDataError("duplicate member in peers configuration"));
            }
        }
        config.epoch = p.epoch;
        config.locked = p.locked;
        Ok(config)
    }
}

impl From<&messages::SnapshotMetadata> for SnapshotMetadata {
    fn from(m: &messages::SnapshotMetadata) -> Self {
        SnapshotMetadata {
            last_index: m.last_index,
            last_term: m.last_term,
            peers: Some(PeersConfiguration::from(&m.peers)),
        }
    }
}

impl TryFrom<SnapshotMetadata> for messages::SnapshotMetadata {
    type Error = CorruptedDataError;

    fn try_from(p: SnapshotMetadata) -> Result<Self, Self::Error> {
        let peers = p
            .peers
            .ok_or(CorruptedDataError("snapshot metadata without peers configuration"))?;
        Ok(messages::SnapshotMetadata {
            last_index: p.last_index,
            last_term: p.last_term,
            peers: ConsensusPeersConfiguration::try_from(peers)?,
        })
    }
}

impl From<&messages::SnapshotRequest> for SnapshotRequest {
    fn from(m: &messages::SnapshotRequest) -> Self {
        SnapshotRequest {
            term: m.term,
            leader: actor_id_bytes(&m.leader),
            offset: m.offset,
            last: m.last,
            metadata: Some(SnapshotMetadata::from(&m.metadata)),
            data: m.data.clone(),
            lease_round: m.lease_round,
        }
    }
}

impl TryFrom<SnapshotRequest> for messages::SnapshotRequest {
    type Error = CorruptedDataError;

    fn try_from(p: SnapshotRequest) -> Result<Self, Self::Error> {
        let metadata = p
            .metadata
            .ok_or(CorruptedDataError("snapshot request without metadata"))?;
        Ok(messages::SnapshotRequest {
            term: p.term,
            leader: actor_id(&p.leader)?,
            offset: p.offset,
            last: p.last,
            metadata: messages::SnapshotMetadata::try_from(metadata)?,
            data: p.data,
            lease_round: p.lease_round,
        })
    }
}

impl From<&messages::SnapshotResponse> for SnapshotResponse {
    fn from(m: &messages::SnapshotResponse) -> Self {
        SnapshotResponse {
            status: m.status,
            term: m.term,
            peers_epoch: m.peers_epoch,
            lease_round: m.lease_round,
        }
    }
}

impl TryFrom<SnapshotResponse> for messages::SnapshotResponse {
    type Error = CorruptedDataError;

    fn try_from(p: SnapshotResponse) -> Result<Self, Self::Error> {
        Ok(messages::SnapshotResponse {
            status: p.status,
            term: p.term,
            peers_epoch: p.peers_epoch,
            lease_round: p.lease_round,
        })
    }
}
