//! Framing of persisted records: protobuf varints for integers, fixed-width ids and a single byte
//! for booleans. Mail bodies are full protobuf messages, see `wire`.
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("corrupted data: {0}")]
pub struct CorruptedDataError(pub &'static str);

pub(crate) type Result<T> = std::result::Result<T, CorruptedDataError>;

pub(crate) trait Varint: Sized {
    fn encode_varint(&self, buf: &mut impl BufMut);
    fn decode_varint(buf: &mut impl Buf) -> Result<Self>;
}

pub(crate) trait Encode {
    fn encode(&self, buf: &mut impl BufMut);

    fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

pub(crate) trait Decode: Sized {
    fn decode(buf: &mut impl Buf) -> Result<Self>;

    /// Decode a whole buffer. Trailing bytes are treated as corruption.
    fn decode_exact(mut bytes: &[u8]) -> Result<Self> {
        let value = Self::decode(&mut bytes)?;
        if bytes.has_remaining() {
            return Err(CorruptedDataError("trailing bytes after record"));
        }
        Ok(value)
    }
}

impl Varint for u64 {
    fn encode_varint(&self, buf: &mut impl BufMut) {
        prost::encoding::encode_varint(*self, buf);
    }

    fn decode_varint(buf: &mut impl Buf) -> Result<Self> {
        Ok(prost::encoding::decode_varint(buf)?)
    }
}

impl From<prost::DecodeError> for CorruptedDataError {
    fn from(_: prost::DecodeError) -> Self {
        CorruptedDataError("malformed protobuf encoding")
    }
}

impl Encode for u64 {
    fn encode(&self, buf: &mut impl BufMut) {
        self.encode_varint(buf);
    }
}

impl Decode for u64 {
    fn decode(buf: &mut impl Buf) -> Result<Self> {
        u64::decode_varint(buf)
    }
}

impl Encode for bool {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(*self as u8);
    }
}

impl Decode for bool {
    fn decode(buf: &mut impl Buf) -> Result<Self> {
        match get_u8(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CorruptedDataError("invalid value for bool, must be 0 or 1")),
        }
    }
}

pub(crate) fn get_u8(buf: &mut impl Buf) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(CorruptedDataError("expected 1 more byte"));
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_array<const N: usize>(buf: &mut impl Buf) -> Result<[u8; N]> {
    if buf.remaining() < N {
        return Err(CorruptedDataError("not enough bytes for fixed-width field"));
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        value.encode_varint(&mut buf);
        buf
    }

    #[test]
    fn varint_layout() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(7), vec![0x07]);
        assert_eq!(varint_bytes(300), vec![0xac, 0x02]);
        assert_eq!(varint_bytes(u64::MAX).len(), 10);

        let mut slice: &[u8] = &[0xac, 0x02];
        assert_eq!(u64::decode_varint(&mut slice), Ok(300));
        let max = varint_bytes(u64::MAX);
        assert_eq!(u64::decode_varint(&mut max.as_slice()), Ok(u64::MAX));
    }

    #[test]
    fn varint_rejects_truncated_and_overlong_input() {
        let mut truncated: &[u8] = &[0x80, 0x80];
        assert!(u64::decode_varint(&mut truncated).is_err());

        let overlong = [0xffu8; 11];
        assert!(u64::decode_varint(&mut &overlong[..]).is_err());
    }

    #[test]
    fn bool_rejects_unknown_values() {
        assert_eq!(bool::decode_exact(&[1]), Ok(true));
        assert!(bool::decode_exact(&[2]).is_err());
        assert!(bool::decode_exact(&[]).is_err());
    }
}
