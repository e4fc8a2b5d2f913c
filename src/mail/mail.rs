use bytes::Bytes;

/// Mail is the envelope carrying every inter-node message: an opaque header and content. An
/// empty mail is the sentinel for "not a consensus message" or "no reply".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mail {
    pub header: Bytes,
    pub content: Bytes,
}

impl Mail {
    pub fn new(header: Bytes, content: Bytes) -> Self {
        Mail { header, content }
    }

    pub fn empty() -> Self {
        Mail::default()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.content.is_empty()
    }
}
