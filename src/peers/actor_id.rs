use crate::mail::codec::{self, CorruptedDataError, Decode, Encode};
use bytes::{Buf, BufMut};
use std::convert::TryFrom;
use std::fmt;

pub const ACTOR_ID_LEN: usize = 16;

/// ActorId identifies one cluster member. It is a fixed-width opaque value, ordered bytewise.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId([u8; ACTOR_ID_LEN]);

impl ActorId {
    pub fn new(bytes: [u8; ACTOR_ID_LEN]) -> Self {
        ActorId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_LEN] {
        &self.0
    }
}

impl From<u128> for ActorId {
    fn from(value: u128) -> Self {
        ActorId(value.to_be_bytes())
    }
}

impl From<u64> for ActorId {
    fn from(value: u64) -> Self {
        ActorId::from(value as u128)
    }
}

impl TryFrom<&[u8]> for ActorId {
    type Error = CorruptedDataError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; ACTOR_ID_LEN]>::try_from(bytes)
            .map(ActorId)
            .map_err(|_| CorruptedDataError("actor id must be 16 bytes"))
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Small ids are the common case in tests and local clusters.
        let value = u128::from_be_bytes(self.0);
        if value <= u64::MAX as u128 {
            write!(f, "Actor({})", value)
        } else {
            write!(f, "Actor({:032x})", value)
        }
    }
}

impl Encode for ActorId {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }
}

impl Decode for ActorId {
    fn decode(buf: &mut impl Buf) -> codec::Result<Self> {
        codec::get_array::<ACTOR_ID_LEN>(buf).map(ActorId)
    }
}
