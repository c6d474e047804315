//! Raw iterator implementation for RocksDB backend.

use rocksdb::DBRawIterator;

use crate::RawIterator;

impl RawIterator for DBRawIterator<'_> {
    fn seek_to_first(&mut self) {
        DBRawIterator::seek_to_first(self)
    }

    fn seek<K: AsRef<[u8]>>(&mut self, key: K) {
        DBRawIterator::seek(self, key)
    }

    fn next(&mut self) {
        DBRawIterator::next(self)
    }

    fn value(&self) -> Option<&[u8]> {
        DBRawIterator::value(self)
    }

    fn key(&self) -> Option<&[u8]> {
        DBRawIterator::key(self)
    }

    fn valid(&self) -> bool {
        DBRawIterator::valid(self)
    }
}
