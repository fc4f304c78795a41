use super::{JoinKey, StreamRecord};
use std::collections::HashMap;

/// Join key to bucket of every record joined under that key.
///
/// Inserts append and never deduplicate: the table is the history of what
/// has been joined during the run. Nothing is evicted.
#[derive(Debug, Default, Clone)]
pub struct MultiHashTable {
    buckets: HashMap<JoinKey, Vec<StreamRecord>>,
    entries: usize,
}

impl MultiHashTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(keys: usize) -> Self {
        Self {
            buckets: HashMap::with_capacity(keys),
            entries: 0,
        }
    }

    /// Append `record` to the bucket of its own join key.
    pub fn insert(&mut self, record: StreamRecord) {
        self.buckets
            .entry(record.join_key())
            .or_default()
            .push(record);
        self.entries += 1;
    }

    /// Records joined under `key`, in processing order.
    pub fn bucket(&self, key: JoinKey) -> Option<&[StreamRecord]> {
        self.buckets.get(&key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: JoinKey) -> bool {
        self.buckets.contains_key(&key)
    }

    /// Join keys in ascending order.
    pub fn keys(&self) -> Vec<JoinKey> {
        let mut keys: Vec<JoinKey> = self.buckets.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Buckets in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (JoinKey, &[StreamRecord])> + '_ {
        self.keys()
            .into_iter()
            .filter_map(move |key| self.bucket(key).map(|bucket| (key, bucket)))
    }

    /// Total records across all buckets.
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
