use crate::commitlog;
use crate::mail::codec::{self, get_u8, CorruptedDataError, Decode, Encode};
use crate::peers::ConsensusPeersConfiguration;
use crate::replica::Term;
use bytes::{Buf, BufMut, Bytes};
use std::io;

/// EntryPayload is what a raft log entry carries: application data, or a control record that the
/// consensus applies itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryPayload {
    Data(Bytes),
    LockPeers,
    ConfigurePeers(ConsensusPeersConfiguration),
    UnlockPeers,
    // Appended by every new leader so that entries from earlier terms can commit.
    Noop,
}

const TAG_DATA: u8 = 0;
const TAG_LOCK_PEERS: u8 = 1;
const TAG_CONFIGURE_PEERS: u8 = 2;
const TAG_UNLOCK_PEERS: u8 = 3;
const TAG_NOOP: u8 = 4;

impl EntryPayload {
    pub fn is_data(&self) -> bool {
        matches!(self, EntryPayload::Data(_))
    }

    pub(crate) fn is_membership_change(&self) -> bool {
        matches!(
            self,
            EntryPayload::LockPeers | EntryPayload::ConfigurePeers(_) | EntryPayload::UnlockPeers
        )
    }
}

impl Encode for EntryPayload {
    fn encode(&self, buf: &mut impl BufMut) {
        match self {
            EntryPayload::Data(data) => {
                buf.put_u8(TAG_DATA);
                buf.put_slice(data);
            }
            EntryPayload::LockPeers => buf.put_u8(TAG_LOCK_PEERS),
            EntryPayload::ConfigurePeers(config) => {
                buf.put_u8(TAG_CONFIGURE_PEERS);
                config.encode(buf);
            }
            EntryPayload::UnlockPeers => buf.put_u8(TAG_UNLOCK_PEERS),
            EntryPayload::Noop => buf.put_u8(TAG_NOOP),
        }
    }
}

impl Decode for EntryPayload {
    fn decode(buf: &mut impl Buf) -> codec::Result<Self> {
        match get_u8(buf)? {
            // Data runs to the end of the record.
            TAG_DATA => Ok(EntryPayload::Data(buf.copy_to_bytes(buf.remaining()))),
            TAG_LOCK_PEERS => Ok(EntryPayload::LockPeers),
            TAG_CONFIGURE_PEERS => Ok(EntryPayload::ConfigurePeers(ConsensusPeersConfiguration::decode(buf)?)),
            TAG_UNLOCK_PEERS => Ok(EntryPayload::UnlockPeers),
            TAG_NOOP => Ok(EntryPayload::Noop),
            _ => Err(CorruptedDataError("unknown log entry payload tag")),
        }
    }
}

/// Byte representation:
///
/// ```text
/// |                                         1                               |
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 0 | 1 | 2 | 3 | 4 | 5 | ...     |
/// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-...-----+
/// |Vrs|       Term (8 bytes)          |Tag|   Payload (variable size)   ... |
/// +---+-------------------------------+---+-----------------------------...-+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Term` - raft leadership term when this entry was created, little endian
/// * `Tag` - payload kind: data, lock peers, configure peers, unlock peers, no-op
/// * `Payload` - app data, or the encoded peers configuration for a configure record
///
/// Checksum and payload length are not needed; the underlying commitlog hands back exactly the
/// bytes that were appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaftLogEntry {
    pub(crate) term: Term,
    pub(crate) payload: EntryPayload,
}

const RAFT_LOG_ENTRY_FORMAT_VERSION: u8 = 2;

impl RaftLogEntry {
    pub fn term(&self) -> u64 {
        self.term.as_u64()
    }

    pub fn payload(&self) -> &EntryPayload {
        &self.payload
    }
}

impl commitlog::Entry for RaftLogEntry {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 8 + 1);
        bytes.put_u8(RAFT_LOG_ENTRY_FORMAT_VERSION);
        bytes.put_u64_le(self.term.as_u64());
        self.payload.encode(&mut bytes);
        bytes
    }

    fn from_bytes(mut bytes: &[u8]) -> Result<Self, io::Error> {
        if bytes.len() < 1 + 8 + 1 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "log entry is too short"));
        }
        let version = bytes.get_u8();
        if version != RAFT_LOG_ENTRY_FORMAT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown log entry format version {}", version),
            ));
        }
        let term = Term::new(bytes.get_u64_le());
        let payload =
            EntryPayload::decode_exact(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(RaftLogEntry { term, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::Entry;
    use crate::peers::ActorId;

    #[test]
    fn layout_matches_documented_format() {
        let entry = RaftLogEntry {
            term: Term::new(0x0102),
            payload: EntryPayload::Data(Bytes::from_static(b"hi")),
        };

        assert_eq!(
            entry.to_bytes(),
            vec![RAFT_LOG_ENTRY_FORMAT_VERSION, 0x02, 0x01, 0, 0, 0, 0, 0, 0, TAG_DATA, b'h', b'i']
        );
    }

    #[test]
    fn control_entries_survive_the_byte_form() {
        let config = ConsensusPeersConfiguration::initial(vec![ActorId::from(1u64), ActorId::from(2u64)]);
        for payload in vec![
            EntryPayload::LockPeers,
            EntryPayload::ConfigurePeers(config),
            EntryPayload::UnlockPeers,
            EntryPayload::Noop,
            EntryPayload::Data(Bytes::new()),
        ] {
            let entry = RaftLogEntry {
                term: Term::new(3),
                payload,
            };
            assert_eq!(RaftLogEntry::from_bytes(&entry.to_bytes()).unwrap(), entry);
        }
    }

    #[test]
    fn bad_records_are_invalid_data() {
        let too_short = RaftLogEntry::from_bytes(&[RAFT_LOG_ENTRY_FORMAT_VERSION, 1]).unwrap_err();
        assert_eq!(too_short.kind(), io::ErrorKind::InvalidData);

        let unknown_tag = RaftLogEntry::from_bytes(&[RAFT_LOG_ENTRY_FORMAT_VERSION, 1, 0, 0, 0, 0, 0, 0, 0, 9]);
        assert_eq!(unknown_tag.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
