use crate::mail::codec::CorruptedDataError;
use crate::mail::messages::{
    HeartbeatRequest, HeartbeatResponse, SnapshotRequest, SnapshotResponse, VoteRequest, VoteResponse,
};
use crate::mail::{wire, Mail};
use bytes::{BufMut, Bytes, BytesMut};

const RAFT_MAIL_MAGIC: &[u8; 4] = b"RAFT";
const RAFT_MAIL_HEADER_LEN: usize = RAFT_MAIL_MAGIC.len() + 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RaftMailType {
    VoteRequest,
    VoteResponse,
    PrevoteRequest,
    PrevoteResponse,
    HeartbeatRequest,
    HeartbeatResponse,
    SnapshotRequest,
    SnapshotResponse,
    Unknown,
}

impl RaftMailType {
    fn from_u8(tag: u8) -> Self {
        match tag {
            1 => RaftMailType::VoteRequest,
            2 => RaftMailType::VoteResponse,
            3 => RaftMailType::PrevoteRequest,
            4 => RaftMailType::PrevoteResponse,
            5 => RaftMailType::HeartbeatRequest,
            6 => RaftMailType::HeartbeatResponse,
            7 => RaftMailType::SnapshotRequest,
            8 => RaftMailType::SnapshotResponse,
            _ => RaftMailType::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RaftMailType::VoteRequest => 1,
            RaftMailType::VoteResponse => 2,
            RaftMailType::PrevoteRequest => 3,
            RaftMailType::PrevoteResponse => 4,
            RaftMailType::HeartbeatRequest => 5,
            RaftMailType::HeartbeatResponse => 6,
            RaftMailType::SnapshotRequest => 7,
            RaftMailType::SnapshotResponse => 8,
            RaftMailType::Unknown => 0,
        }
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            RaftMailType::VoteRequest
                | RaftMailType::PrevoteRequest
                | RaftMailType::HeartbeatRequest
                | RaftMailType::SnapshotRequest
        )
    }
}

/// RaftMessage is the typed form of a consensus mail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RaftMessage {
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    PrevoteRequest(VoteRequest),
    PrevoteResponse(VoteResponse),
    HeartbeatRequest(HeartbeatRequest),
    HeartbeatResponse(HeartbeatResponse),
    SnapshotRequest(SnapshotRequest),
    SnapshotResponse(SnapshotResponse),
}

impl RaftMessage {
    pub fn mail_type(&self) -> RaftMailType {
        match self {
            RaftMessage::VoteRequest(_) => RaftMailType::VoteRequest,
            RaftMessage::VoteResponse(_) => RaftMailType::VoteResponse,
            RaftMessage::PrevoteRequest(_) => RaftMailType::PrevoteRequest,
            RaftMessage::PrevoteResponse(_) => RaftMailType::PrevoteResponse,
            RaftMessage::HeartbeatRequest(_) => RaftMailType::HeartbeatRequest,
            RaftMessage::HeartbeatResponse(_) => RaftMailType::HeartbeatResponse,
            RaftMessage::SnapshotRequest(_) => RaftMailType::SnapshotRequest,
            RaftMessage::SnapshotResponse(_) => RaftMailType::SnapshotResponse,
        }
    }

    /// Term carried by the message, whatever its kind.
    pub fn term(&self) -> u64 {
        match self {
            RaftMessage::VoteRequest(m) | RaftMessage::PrevoteRequest(m) => m.term,
            RaftMessage::VoteResponse(m) | RaftMessage::PrevoteResponse(m) => m.term,
            RaftMessage::HeartbeatRequest(m) => m.term,
            RaftMessage::HeartbeatResponse(m) => m.term,
            RaftMessage::SnapshotRequest(m) => m.term,
            RaftMessage::SnapshotResponse(m) => m.term,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("mail is not a consensus message")]
    NotConsensusMail,
    #[error("consensus mail content is corrupted: {0}")]
    Corrupted(#[from] CorruptedDataError),
}

/// RaftMailExtractor classifies inbound mail and unpacks its typed content.
pub struct RaftMailExtractor;

impl RaftMailExtractor {
    pub fn mail_type(mail: &Mail) -> RaftMailType {
        let header = &mail.header;
        if header.len() != RAFT_MAIL_HEADER_LEN || &header[..RAFT_MAIL_MAGIC.len()] != RAFT_MAIL_MAGIC {
            return RaftMailType::Unknown;
        }
        RaftMailType::from_u8(header[RAFT_MAIL_MAGIC.len()])
    }

    pub fn is_consensus_mail(mail: &Mail) -> bool {
        Self::mail_type(mail) != RaftMailType::Unknown
    }

    pub fn extract(mail: &Mail) -> Result<RaftMessage, ExtractError> {
        let content = &mail.content[..];
        let message = match Self::mail_type(mail) {
            RaftMailType::VoteRequest => RaftMessage::VoteRequest(wire::decode::<wire::VoteRequest, _>(content)?),
            RaftMailType::VoteResponse => RaftMessage::VoteResponse(wire::decode::<wire::VoteResponse, _>(content)?),
            RaftMailType::PrevoteRequest => {
                RaftMessage::PrevoteRequest(wire::decode::<wire::VoteRequest, _>(content)?)
            }
            RaftMailType::PrevoteResponse => {
                RaftMessage::PrevoteResponse(wire::decode::<wire::VoteResponse, _>(content)?)
            }
            RaftMailType::HeartbeatRequest => {
                RaftMessage::HeartbeatRequest(wire::decode::<wire::HeartbeatRequest, _>(content)?)
            }
            RaftMailType::HeartbeatResponse => {
                RaftMessage::HeartbeatResponse(wire::decode::<wire::HeartbeatResponse, _>(content)?)
            }
            RaftMailType::SnapshotRequest => {
                RaftMessage::SnapshotRequest(wire::decode::<wire::SnapshotRequest, _>(content)?)
            }
            RaftMailType::SnapshotResponse => {
                RaftMessage::SnapshotResponse(wire::decode::<wire::SnapshotResponse, _>(content)?)
            }
            RaftMailType::Unknown => return Err(ExtractError::NotConsensusMail),
        };
        Ok(message)
    }

    /// is_granted reads a response mail as a quorum vote: a granted (pre)vote, a successful
    /// heartbeat or an accepted snapshot chunk. Anything else counts against the quorum.
    pub fn is_granted(mail: &Mail) -> bool {
        match Self::extract(mail) {
            Ok(RaftMessage::VoteResponse(r)) | Ok(RaftMessage::PrevoteResponse(r)) => r.granted,
            Ok(RaftMessage::HeartbeatResponse(r)) => r.success,
            Ok(RaftMessage::SnapshotResponse(r)) => r.status,
            _ => false,
        }
    }
}

/// RaftMailBuilder packs typed messages into mail.
pub struct RaftMailBuilder;

impl RaftMailBuilder {
    pub fn build(message: &RaftMessage) -> Mail {
        let content = match message {
            RaftMessage::VoteRequest(m) | RaftMessage::PrevoteRequest(m) => wire::encode::<_, wire::VoteRequest>(m),
            RaftMessage::VoteResponse(m) | RaftMessage::PrevoteResponse(m) => {
                wire::encode::<_, wire::VoteResponse>(m)
            }
            RaftMessage::HeartbeatRequest(m) => wire::encode::<_, wire::HeartbeatRequest>(m),
            RaftMessage::HeartbeatResponse(m) => wire::encode::<_, wire::HeartbeatResponse>(m),
            RaftMessage::SnapshotRequest(m) => wire::encode::<_, wire::SnapshotRequest>(m),
            RaftMessage::SnapshotResponse(m) => wire::encode::<_, wire::SnapshotResponse>(m),
        };
        Mail::new(Self::header(message.mail_type()), content)
    }

    fn header(mail_type: RaftMailType) -> Bytes {
        let mut header = BytesMut::with_capacity(RAFT_MAIL_HEADER_LEN);
        header.put_slice(RAFT_MAIL_MAGIC);
        header.put_u8(mail_type.as_u8());
        header.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::messages::{SnapshotMetadata, WireEntry};
    use crate::peers::{ActorId, ConsensusPeersConfiguration};

    fn heartbeat() -> HeartbeatRequest {
        HeartbeatRequest {
            term: 4,
            leader: ActorId::from(2u64),
            prev_log_index: 10,
            prev_log_term: 3,
            entries: vec![
                WireEntry {
                    term: 4,
                    payload: Bytes::from_static(b"a"),
                },
                WireEntry {
                    term: 4,
                    payload: Bytes::from_static(b"bc"),
                },
            ],
            leader_commit: 9,
            lease_round: 17,
        }
    }

    #[test]
    fn classifies_and_extracts_every_request_kind() {
        let vote = VoteRequest {
            term: 3,
            candidate: ActorId::from(1u64),
            last_log_index: 5,
            last_log_term: 2,
        };
        let snapshot = SnapshotRequest {
            term: 4,
            leader: ActorId::from(2u64),
            offset: 64,
            last: true,
            metadata: SnapshotMetadata {
                last_index: 30,
                last_term: 3,
                peers: ConsensusPeersConfiguration::initial(vec![ActorId::from(1u64), ActorId::from(2u64)]),
            },
            data: Bytes::from_static(b"chunk"),
            lease_round: 8,
        };
        let messages = vec![
            RaftMessage::VoteRequest(vote.clone()),
            RaftMessage::PrevoteRequest(vote),
            RaftMessage::HeartbeatRequest(heartbeat()),
            RaftMessage::SnapshotRequest(snapshot),
        ];

        for message in messages {
            let mail = RaftMailBuilder::build(&message);
            assert_eq!(RaftMailExtractor::mail_type(&mail), message.mail_type());
            assert!(RaftMailExtractor::mail_type(&mail).is_request());
            assert_eq!(RaftMailExtractor::extract(&mail).unwrap(), message);
        }
    }

    #[test]
    fn foreign_and_empty_mail_is_unknown() {
        assert_eq!(RaftMailExtractor::mail_type(&Mail::empty()), RaftMailType::Unknown);

        let foreign = Mail::new(Bytes::from_static(b"HTTP/"), Bytes::from_static(b"GET /"));
        assert!(!RaftMailExtractor::is_consensus_mail(&foreign));
        assert!(matches!(
            RaftMailExtractor::extract(&foreign),
            Err(ExtractError::NotConsensusMail)
        ));

        let unknown_tag = Mail::new(Bytes::from_static(b"RAFT\x63"), Bytes::new());
        assert_eq!(RaftMailExtractor::mail_type(&unknown_tag), RaftMailType::Unknown);
    }

    #[test]
    fn truncated_content_is_corruption() {
        let mail = RaftMailBuilder::build(&RaftMessage::HeartbeatRequest(heartbeat()));
        let truncated = Mail::new(mail.header.clone(), mail.content.slice(..mail.content.len() - 1));

        assert!(matches!(
            RaftMailExtractor::extract(&truncated),
            Err(ExtractError::Corrupted(_))
        ));
        assert!(!RaftMailExtractor::is_granted(&truncated));
    }

    #[test]
    fn is_granted_follows_response_kind() {
        let granted_vote = RaftMailBuilder::build(&RaftMessage::PrevoteResponse(VoteResponse {
            granted: true,
            term: 3,
        }));
        let failed_heartbeat = RaftMailBuilder::build(&RaftMessage::HeartbeatResponse(HeartbeatResponse {
            success: false,
            term: 3,
            match_index: 0,
            lease_round: 1,
        }));
        let accepted_chunk = RaftMailBuilder::build(&RaftMessage::SnapshotResponse(SnapshotResponse {
            status: true,
            term: 3,
            peers_epoch: 1,
            lease_round: 2,
        }));

        assert!(RaftMailExtractor::is_granted(&granted_vote));
        assert!(!RaftMailExtractor::is_granted(&failed_heartbeat));
        assert!(RaftMailExtractor::is_granted(&accepted_chunk));
        assert!(!RaftMailExtractor::is_granted(&Mail::empty()));
    }
}
