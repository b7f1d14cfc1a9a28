//! Write-batch wire format: a 12-byte sequence+count header followed by
//! tag-prefixed mutations, each carrying a per-mutation locality-group tag
//! so a single batch can hold mutations for more than one locality group.
//!
//! In a single-LG database every mutation's LG id is `0` and this extra
//! varint costs one byte per mutation; it is still always present so the
//! replay path never needs to special-case single- vs multi-LG databases.

use std::collections::BTreeMap;

use crate::codec::{
    put_varint32, DecodeVarint, NumberDecoder, VarLengthSliceReader,
};
use crate::error::{Error, Result};
use crate::types::{LgId, SequenceNumber, ValueType};

const HEADER_SIZE: usize = 12;

pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch {
            rep: vec![0u8; HEADER_SIZE],
        }
    }

    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
    }

    pub fn sequence(&self) -> SequenceNumber {
        let mut head = &self.rep[0..8];
        head.decode_u64_le().expect("header present")
    }

    pub fn set_sequence(&mut self, seq: SequenceNumber) {
        self.rep[0..8].copy_from_slice(&seq.to_le_bytes());
    }

    pub fn count(&self) -> u32 {
        let mut head = &self.rep[8..12];
        head.decode_u32_le().expect("header present")
    }

    pub fn set_count(&mut self, count: u32) {
        self.rep[8..12].copy_from_slice(&count.to_le_bytes());
    }

    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Replaces the batch's contents with an already-encoded buffer (e.g.
    /// one just read off a WAL record). The buffer must be at least
    /// `HEADER_SIZE` bytes; the caller is responsible for any further
    /// validation (see `iterate`).
    pub fn set_contents(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption(
                "write batch too small for header".into(),
            ));
        }
        self.rep.clear();
        self.rep.extend_from_slice(data);
        Ok(())
    }

    pub fn put(&mut self, lg_id: LgId, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_varint32(&mut self.rep, lg_id);
        put_varint32(&mut self.rep, key.len() as u32);
        self.rep.extend_from_slice(key);
        put_varint32(&mut self.rep, value.len() as u32);
        self.rep.extend_from_slice(value);
    }

    pub fn delete(&mut self, lg_id: LgId, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_varint32(&mut self.rep, lg_id);
        put_varint32(&mut self.rep, key.len() as u32);
        self.rep.extend_from_slice(key);
    }

    /// Appends another batch's mutations to this one, bumping this batch's
    /// count accordingly. The two batches' own sequence numbers are
    /// unrelated; callers that care about sequence contiguity must arrange
    /// it themselves.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[HEADER_SIZE..]);
    }

    /// Decodes every mutation in the batch, invoking `handler` for each.
    /// Returns `Error::Corruption` if the decoded mutation count doesn't
    /// match the header, or if any mutation is malformed.
    pub fn iterate<H: Handler>(&self, handler: &mut H) -> Result<()> {
        if self.rep.len() < HEADER_SIZE {
            return Err(Error::Corruption("malformed write batch (no header)".into()));
        }
        let mut input = &self.rep[HEADER_SIZE..];
        let mut found = 0u32;

        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            let kind = ValueType::try_from(tag)?;
            let lg_id = input.decode_varint32()?;
            let key = input.get_length_prefixed_slice()?;
            match kind {
                ValueType::Value => {
                    let value = input.get_length_prefixed_slice()?;
                    handler.put(lg_id, key, value);
                }
                ValueType::Deletion => {
                    handler.delete(lg_id, key);
                }
            }
            found += 1;
        }

        if found != self.count() {
            return Err(Error::Corruption(format!(
                "write batch header says {} mutations, found {found}",
                self.count()
            )));
        }
        Ok(())
    }
}

pub trait Handler {
    fn put(&mut self, lg_id: LgId, key: &[u8], value: &[u8]);
    fn delete(&mut self, lg_id: LgId, key: &[u8]);
}

struct Splitter {
    sequence: SequenceNumber,
    by_lg: BTreeMap<LgId, WriteBatch>,
}

impl Splitter {
    fn batch_for(&mut self, lg_id: LgId) -> &mut WriteBatch {
        self.by_lg.entry(lg_id).or_insert_with(|| {
            let mut b = WriteBatch::new();
            b.set_sequence(self.sequence);
            b
        })
    }
}

impl Handler for Splitter {
    fn put(&mut self, lg_id: LgId, key: &[u8], value: &[u8]) {
        self.batch_for(lg_id).put(lg_id, key, value);
    }

    fn delete(&mut self, lg_id: LgId, key: &[u8]) {
        self.batch_for(lg_id).delete(lg_id, key);
    }
}

/// Splits a batch that may carry mutations for multiple locality groups into
/// one sub-batch per locality group, each stamped with the parent batch's
/// original sequence number.
///
/// The sub-batches' own counts reflect only the mutations routed to that LG;
/// they do not, and are not meant to, sum back to exactly the parent's
/// count-implied sequence range when replayed independently — see DESIGN.md
/// for the documented, deliberately-preserved quirk this implies for
/// per-LG `max_sequence` bookkeeping.
pub fn separate_locality_group(batch: &WriteBatch) -> Result<BTreeMap<LgId, WriteBatch>> {
    let mut splitter = Splitter {
        sequence: batch.sequence(),
        by_lg: BTreeMap::new(),
    };
    batch.iterate(&mut splitter)?;
    Ok(splitter.by_lg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        puts: Vec<(LgId, Vec<u8>, Vec<u8>)>,
        deletes: Vec<(LgId, Vec<u8>)>,
    }

    impl Handler for Recorder {
        fn put(&mut self, lg_id: LgId, key: &[u8], value: &[u8]) {
            self.puts.push((lg_id, key.to_vec(), value.to_vec()));
        }
        fn delete(&mut self, lg_id: LgId, key: &[u8]) {
            self.deletes.push((lg_id, key.to_vec()));
        }
    }

    #[test]
    fn round_trips_puts_and_deletes() {
        let mut batch = WriteBatch::new();
        batch.set_sequence(100);
        batch.put(0, b"a", b"1");
        batch.delete(0, b"b");
        batch.put(2, b"c", b"3");
        assert_eq!(batch.count(), 3);

        let mut recorder = Recorder::default();
        batch.iterate(&mut recorder).unwrap();
        assert_eq!(
            recorder.puts,
            vec![
                (0, b"a".to_vec(), b"1".to_vec()),
                (2, b"c".to_vec(), b"3".to_vec())
            ]
        );
        assert_eq!(recorder.deletes, vec![(0, b"b".to_vec())]);
    }

    #[test]
    fn separates_by_locality_group_preserving_sequence() {
        let mut batch = WriteBatch::new();
        batch.set_sequence(500);
        batch.put(0, b"a", b"1");
        batch.put(1, b"b", b"2");
        batch.put(1, b"c", b"3");

        let split = separate_locality_group(&batch).unwrap();
        assert_eq!(split.len(), 2);
        assert_eq!(split[&0].sequence(), 500);
        assert_eq!(split[&1].sequence(), 500);
        assert_eq!(split[&0].count(), 1);
        assert_eq!(split[&1].count(), 2);
    }

    #[test]
    fn mismatched_count_is_corruption() {
        let mut batch = WriteBatch::new();
        batch.put(0, b"a", b"1");
        batch.set_count(5);
        let mut recorder = Recorder::default();
        assert!(batch.iterate(&mut recorder).is_err());
    }
}
