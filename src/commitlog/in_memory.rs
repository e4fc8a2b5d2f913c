use crate::commitlog::{Entry, Index, Log};
use std::io;
use std::marker::PhantomData;

/// InMemoryLog models a durable log in RAM. Entries are stored in their byte form so that the
/// entry codec is exercised the same way a disk-backed log would.
pub struct InMemoryLog<E: Entry> {
    log: Vec<Vec<u8>>,
    // Number of entries compacted away from the front of `log`.
    dropped: u64,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn create() -> Result<Self, io::Error> {
        Ok(InMemoryLog {
            log: vec![],
            dropped: 0,
            _pd: PhantomData::default(),
        })
    }

    fn vec_index(&self, index: Index) -> Option<usize> {
        // Log API states that Index starts from 1.
        let offset = index.as_u64().checked_sub(self.dropped + 1)?;
        Some(offset as usize)
    }
}

impl<E: Entry + Send> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        self.log.push(entry.to_bytes());

        Ok(Index::new(self.dropped + self.log.len() as u64))
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.vec_index(index).and_then(|i| self.log.get(i)) {
            Some(bytes) => E::from_bytes(bytes).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, index: Index) {
        match self.vec_index(index) {
            Some(i) => self.log.truncate(i),
            None => self.log.clear(),
        }
    }

    fn drop_until(&mut self, index: Index) {
        if index.as_u64() <= self.dropped {
            return;
        }
        match self.vec_index(index) {
            Some(i) if i + 1 < self.log.len() => {
                self.log.drain(..=i);
                self.dropped = index.as_u64();
            }
            _ => {
                self.log.clear();
                self.dropped = index.as_u64();
            }
        }
    }

    fn first_index(&self) -> Index {
        Index::new(self.dropped + 1)
    }

    fn next_index(&self) -> Index {
        Index::new(self.dropped + self.log.len() as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Raw(Vec<u8>);

    impl Entry for Raw {
        fn to_bytes(&self) -> Vec<u8> {
            self.0.clone()
        }

        fn from_bytes(bytes: &[u8]) -> Result<Self, io::Error> {
            Ok(Raw(bytes.to_vec()))
        }
    }

    fn log_with(n: u8) -> InMemoryLog<Raw> {
        let mut log = InMemoryLog::create().unwrap();
        for i in 1..=n {
            log.append(Raw(vec![i])).unwrap();
        }
        log
    }

    #[test]
    fn append_read_truncate() {
        let mut log = log_with(3);
        assert_eq!(log.next_index(), Index::new(4));
        assert_eq!(log.read(Index::new(2)).unwrap(), Some(Raw(vec![2])));
        assert_eq!(log.read(Index::new(4)).unwrap(), None);

        log.truncate(Index::new(2));
        assert_eq!(log.next_index(), Index::new(2));
        assert_eq!(log.read(Index::new(2)).unwrap(), None);
        assert_eq!(log.append(Raw(vec![9])).unwrap(), Index::new(2));
    }

    #[test]
    fn drop_until_keeps_indexes_stable() {
        let mut log = log_with(5);
        log.drop_until(Index::new(3));

        assert_eq!(log.first_index(), Index::new(4));
        assert_eq!(log.next_index(), Index::new(6));
        assert_eq!(log.size_in_entries(), 2);
        assert_eq!(log.read(Index::new(3)).unwrap(), None);
        assert_eq!(log.read(Index::new(4)).unwrap(), Some(Raw(vec![4])));
        assert_eq!(log.append(Raw(vec![6])).unwrap(), Index::new(6));
    }

    #[test]
    fn drop_until_past_end_empties_log() {
        let mut log = log_with(2);
        log.drop_until(Index::new(10));

        assert_eq!(log.size_in_entries(), 0);
        assert_eq!(log.first_index(), Index::new(11));
        assert_eq!(log.append(Raw(vec![1])).unwrap(), Index::new(11));
    }
}
