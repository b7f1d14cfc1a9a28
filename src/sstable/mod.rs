//! A deliberately simplified SSTable format: one data block, one optional
//! filter block, a fixed footer. No restart points, no two-level index, no
//! block compression.
//!
//! A full multi-block, restart-point-compressed table format with a
//! two-level iterator is real complexity meant for a full read/write/
//! compaction path. Repair only ever needs to write a table once (after
//! recovering a memtable) and scan it once for key range and max sequence,
//! so the table builder and table cache stay narrow-interface external
//! collaborators rather than something built for speed or space efficiency.
//! See DESIGN.md for the full rationale.

pub mod format;

use std::sync::Arc;

use crate::cmp::{BitwiseComparator, Comparator};
use crate::codec::{put_length_prefixed_slice, VarLengthSliceReader};
use crate::env::{RandomAccessFile, WritableFile};
use crate::error::{Error, Result};
use crate::filter::FilterPolicy;
use crate::iterator::DBIterator;

use format::{BlockHandle, Footer, FOOTER_ENCODED_LENGTH};

pub struct TableBuilder<W: WritableFile> {
    file: W,
    comparator: Arc<dyn Comparator>,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    data: Vec<u8>,
    keys: Vec<Vec<u8>>,
    last_key: Vec<u8>,
    num_entries: usize,
}

impl<W: WritableFile> TableBuilder<W> {
    pub fn new(file: W, filter_policy: Option<Arc<dyn FilterPolicy>>) -> Self {
        Self::with_comparator(file, Arc::new(BitwiseComparator {}), filter_policy)
    }

    /// Like `new`, but orders entries with `comparator` instead of plain
    /// byte comparison. Repair feeds entries in internal-key order, where a
    /// shared user key sorts newest-sequence-first, so comparing with the
    /// same `InternalKeyComparator` the source iterator used is what makes
    /// "strictly increasing" mean the right thing.
    pub fn with_comparator(
        file: W,
        comparator: Arc<dyn Comparator>,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Self {
        TableBuilder {
            file,
            comparator,
            filter_policy,
            data: Vec::new(),
            keys: Vec::new(),
            last_key: Vec::new(),
            num_entries: 0,
        }
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Appends one entry. `key` must sort strictly after the previous key
    /// added, under this builder's comparator (callers feed this from an
    /// already-sorted source, such as a memtable iterator).
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(
            self.num_entries == 0
                || self.comparator.compare(key, &self.last_key) == std::cmp::Ordering::Greater,
            "table builder requires strictly increasing keys"
        );
        put_length_prefixed_slice(&mut self.data, key);
        put_length_prefixed_slice(&mut self.data, value);
        if self.filter_policy.is_some() {
            self.keys.push(key.to_vec());
        }
        self.last_key = key.to_vec();
        self.num_entries += 1;
    }

    /// Flushes the data block, filter block, and footer. Returns the total
    /// file size on success.
    pub fn finish(mut self) -> Result<u64> {
        let data_handle = BlockHandle {
            offset: 0,
            size: self.data.len() as u64,
        };
        self.file.append(&self.data)?;

        let mut filter_handle = BlockHandle::default();
        if let Some(policy) = &self.filter_policy {
            let key_refs: Vec<&[u8]> = self.keys.iter().map(|k| k.as_slice()).collect();
            let mut filter_bytes = Vec::new();
            policy.create_filter(&key_refs, &mut filter_bytes);
            filter_handle = BlockHandle {
                offset: data_handle.size,
                size: filter_bytes.len() as u64,
            };
            self.file.append(&filter_bytes)?;
        }

        let footer = Footer {
            data_handle,
            filter_handle,
        };
        let mut footer_bytes = Vec::new();
        footer.encode(&mut footer_bytes);
        self.file.append(&footer_bytes)?;
        self.file.sync()?;

        Ok(data_handle.size + filter_handle.size + footer_bytes.len() as u64)
    }
}

struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
}

fn parse_data_block(data: &[u8]) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut cursor: &[u8] = data;
    while !cursor.is_empty() {
        let key = cursor.get_length_prefixed_slice()?.to_vec();
        let value = cursor.get_length_prefixed_slice()?.to_vec();
        entries.push(Entry { key, value });
    }
    Ok(entries)
}

pub struct Table {
    entries: Vec<Entry>,
    filter: Option<(Arc<dyn FilterPolicy>, Vec<u8>)>,
}

impl Table {
    pub fn open<R: RandomAccessFile>(
        file: &R,
        file_size: u64,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
    ) -> Result<Table> {
        if file_size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(Error::Corruption(
                "table file too small to contain a footer".into(),
            ));
        }
        let footer_offset = file_size - FOOTER_ENCODED_LENGTH as u64;
        let mut footer_bytes = vec![0u8; FOOTER_ENCODED_LENGTH];
        file.read_exact_at(&mut footer_bytes, footer_offset)?;
        let footer = Footer::decode(&footer_bytes)?;

        let mut data_bytes = vec![0u8; footer.data_handle.size as usize];
        file.read_exact_at(&mut data_bytes, footer.data_handle.offset)?;
        let entries = parse_data_block(&data_bytes)?;

        let filter = if footer.filter_handle.size > 0 {
            filter_policy.map(|policy| {
                let mut filter_bytes = vec![0u8; footer.filter_handle.size as usize];
                let _ = file.read_exact_at(&mut filter_bytes, footer.filter_handle.offset);
                (policy, filter_bytes)
            })
        } else {
            None
        };

        Ok(Table { entries, filter })
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        match &self.filter {
            Some((policy, bytes)) => policy.key_may_match(key, bytes),
            None => true,
        }
    }

    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator {
            entries: &self.entries,
            pos: None,
        }
    }
}

pub struct TableIterator<'a> {
    entries: &'a [Entry],
    pos: Option<usize>,
}

impl<'a> DBIterator for TableIterator<'a> {
    fn valid(&self) -> bool {
        matches!(self.pos, Some(p) if p < self.entries.len())
    }

    fn seek_to_first(&mut self) {
        self.pos = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, target: &[u8]) {
        self.pos = self.entries.iter().position(|e| e.key.as_slice() >= target);
    }

    fn next(&mut self) {
        self.pos = self.pos.map(|p| p + 1);
    }

    fn prev(&mut self) {
        self.pos = match self.pos {
            Some(0) | None => None,
            Some(p) => Some(p - 1),
        };
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator not valid")].key
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos.expect("iterator not valid")].value
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::posix::PosixEnv;
    use crate::env::Env;
    use crate::filter::BloomFilterPolicy;

    #[test]
    fn writes_and_reads_back_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.sst");
        let env = PosixEnv;

        {
            let file = env.new_writable_file(&path).unwrap();
            let mut builder: TableBuilder<_> = TableBuilder::new(file, None);
            builder.add(b"a", b"1");
            builder.add(b"b", b"2");
            builder.add(b"c", b"3");
            let size = builder.finish().unwrap();
            assert_eq!(env.file_size(&path).unwrap(), size);
        }

        let file = env.new_random_access_file(&path).unwrap();
        let size = env.file_size(&path).unwrap();
        let table = Table::open(&file, size, None).unwrap();

        let mut it = table.iter();
        it.seek_to_first();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push((it.key().to_vec(), it.value().to_vec()));
            it.next();
        }
        assert_eq!(
            seen,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"c".to_vec(), b"3".to_vec()),
            ]
        );
    }

    #[test]
    fn accepts_internal_keys_for_an_overwritten_user_key() {
        use crate::cmp::InternalKeyComparator;
        use crate::format::InternalKey;
        use crate::types::ValueType;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.sst");
        let env = PosixEnv;
        let icmp: Arc<dyn Comparator> =
            Arc::new(InternalKeyComparator::new(Arc::new(BitwiseComparator {})));

        // Same user key at two sequences: internal-key order is
        // newest-sequence-first, which is bytewise-descending for the tag,
        // the opposite of plain byte comparison on the encoded key.
        let newer = InternalKey::new(b"k", 11, ValueType::Value);
        let older = InternalKey::new(b"k", 10, ValueType::Value);

        let file = env.new_writable_file(&path).unwrap();
        let mut builder = TableBuilder::with_comparator(file, icmp, None);
        builder.add(newer.encode(), b"v2");
        builder.add(older.encode(), b"v1");
        let size = builder.finish().unwrap();
        assert!(size > 0);
    }

    #[test]
    fn filter_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.sst");
        let env = PosixEnv;
        let policy: Arc<dyn FilterPolicy> = Arc::new(BloomFilterPolicy::new(10));

        {
            let file = env.new_writable_file(&path).unwrap();
            let mut builder = TableBuilder::new(file, Some(policy.clone()));
            builder.add(b"present", b"v");
            builder.finish().unwrap();
        }

        let file = env.new_random_access_file(&path).unwrap();
        let size = env.file_size(&path).unwrap();
        let table = Table::open(&file, size, Some(policy)).unwrap();
        assert!(table.may_contain(b"present"));
    }

    #[test]
    fn too_small_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000001.sst");
        let env = PosixEnv;
        env.new_writable_file(&path).unwrap().append(b"x").unwrap();
        let file = env.new_random_access_file(&path).unwrap();
        assert!(Table::open(&file, 1, None).is_err());
    }
}
