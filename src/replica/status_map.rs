use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

/// StatusMap is the key-value persistence facade the consensus keeps its small durable records in.
/// A successful `put()` must be durable before it returns.
pub trait StatusMap: Send {
    fn get(&self, key: &str) -> Result<Option<Bytes>, io::Error>;
    fn put(&mut self, key: &str, value: Bytes) -> Result<(), io::Error>;
}

/// InMemoryStatusMap keeps records in RAM. Clones share the same records, which lets a test
/// restart a node on top of the state its previous incarnation left behind.
#[derive(Clone, Default)]
pub struct InMemoryStatusMap {
    entries: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl InMemoryStatusMap {
    pub fn new() -> Self {
        InMemoryStatusMap::default()
    }
}

impl StatusMap for InMemoryStatusMap {
    fn get(&self, key: &str) -> Result<Option<Bytes>, io::Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "status map lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Bytes) -> Result<(), io::Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "status map lock poisoned"))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
