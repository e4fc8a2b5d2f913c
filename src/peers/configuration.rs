use crate::mail::codec::{self, CorruptedDataError, Decode, Encode, Varint};
use crate::peers::ActorId;
use bytes::{Buf, BufMut};
use std::collections::BTreeSet;

/// ConsensusPeersConfiguration is the versioned, lockable record of cluster membership. `members`
/// holds every voting member, including the local node.
///
/// Byte representation:
///
/// ```text
/// +----------------+-----------------+--------------------------------+--------+
/// | epoch (varint) | count (varint)  | count x ActorId (16 bytes each) | locked |
/// +----------------+-----------------+--------------------------------+--------+
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusPeersConfiguration {
    pub epoch: u64,
    pub members: BTreeSet<ActorId>,
    pub locked: bool,
}

impl ConsensusPeersConfiguration {
    pub fn initial(members: impl IntoIterator<Item = ActorId>) -> Self {
        ConsensusPeersConfiguration {
            epoch: 0,
            members: members.into_iter().collect(),
            locked: false,
        }
    }

    /// Remote voters as seen from `me`.
    pub fn remote_members(&self, me: &ActorId) -> BTreeSet<ActorId> {
        self.members.iter().filter(|id| *id != me).copied().collect()
    }

    pub fn with_locked(&self, locked: bool) -> Self {
        ConsensusPeersConfiguration {
            locked,
            ..self.clone()
        }
    }

    /// The configuration that a committed membership change produces: next epoch, unlocked.
    pub fn next_epoch(&self, members: BTreeSet<ActorId>) -> Self {
        ConsensusPeersConfiguration {
            epoch: self.epoch + 1,
            members,
            locked: false,
        }
    }
}

impl Encode for ConsensusPeersConfiguration {
    fn encode(&self, buf: &mut impl BufMut) {
        self.epoch.encode_varint(buf);
        (self.members.len() as u64).encode_varint(buf);
        for member in &self.members {
            member.encode(buf);
        }
        self.locked.encode(buf);
    }
}

impl Decode for ConsensusPeersConfiguration {
    fn decode(buf: &mut impl Buf) -> codec::Result<Self> {
        let epoch = u64::decode_varint(buf)?;
        let count = u64::decode_varint(buf)? as usize;
        if count.saturating_mul(crate::peers::ACTOR_ID_LEN) > buf.remaining() {
            return Err(CorruptedDataError("peers configuration member count exceeds buffer"));
        }
        let mut members = BTreeSet::new();
        for _ in 0..count {
            if !members.insert(ActorId::decode(buf)?) {
                return Err(CorruptedDataError("duplicate member in peers configuration"));
            }
        }
        let locked = bool::decode(buf)?;

        Ok(ConsensusPeersConfiguration { epoch, members, locked })
    }
}
