//! Per-locality-group repair state: a value type behind a narrow interface,
//! owned by a `lg_id -> LgRepair` map, rather than friend-class access into
//! a shared database object. This struct and its methods are exactly that
//! interface: `find_files`, `extract_metadata`, `insert_memtable`,
//! `has_memtable`, `build_table_file`, `add_table_meta`, `write_descriptor`,
//! `archive_file`, `max_sequence`.
//!
//! `write_descriptor` follows the write-temp/rename-to-canonical pattern for
//! durable manifest installs; the flush path follows the table builder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cmp::InternalKeyComparator;
use crate::env::Env;
use crate::error::Result;
use crate::filenames::{
    self, descriptor_file_name, table_file_name, temp_file_name, FileNum, FileType,
};
use crate::filter::FilterPolicy;
use crate::format::{parse_internal_key, InternalKey};
use crate::iterator::{DBIterator, VecIterator};
use crate::log::LogWriter;
use crate::memtable::MemTable;
use crate::table_cache::TableCache;
use crate::types::{LgId, SequenceNumber};
use crate::version::{FileMetaData, TableInfo};
use crate::version_edit::VersionEdit;
use crate::write_batch::{Handler, WriteBatch};

pub struct LgRepair<E: Env> {
    lg_id: LgId,
    dir: PathBuf,
    env: E,
    icmp: Arc<InternalKeyComparator>,
    filter_policy: Option<Arc<dyn FilterPolicy>>,
    table_cache: TableCache<E>,

    table_candidates: Vec<FileNum>,
    old_manifests: Vec<PathBuf>,
    stray_files: Vec<PathBuf>,

    tables: Vec<TableInfo>,
    memtable: Option<MemTable>,
    next_file_number: FileNum,
    max_sequence: SequenceNumber,
}

struct MemTableInserter<'a> {
    memtable: &'a mut MemTable,
    seq: SequenceNumber,
    max_sequence: &'a mut SequenceNumber,
    inserted: usize,
    dropped: usize,
}

impl<'a> Handler for MemTableInserter<'a> {
    fn put(&mut self, _lg_id: LgId, key: &[u8], value: &[u8]) {
        if self.seq > *self.max_sequence {
            self.memtable
                .add(self.seq, crate::types::ValueType::Value, key, value);
            *self.max_sequence = self.seq;
            self.inserted += 1;
        } else {
            self.dropped += 1;
        }
        self.seq += 1;
    }

    fn delete(&mut self, _lg_id: LgId, key: &[u8]) {
        if self.seq > *self.max_sequence {
            self.memtable
                .add(self.seq, crate::types::ValueType::Deletion, key, &[]);
            *self.max_sequence = self.seq;
            self.inserted += 1;
        } else {
            self.dropped += 1;
        }
        self.seq += 1;
    }
}

impl<E: Env> LgRepair<E> {
    pub fn new(
        lg_id: LgId,
        dir: PathBuf,
        env: E,
        icmp: Arc<InternalKeyComparator>,
        filter_policy: Option<Arc<dyn FilterPolicy>>,
        table_cache_capacity: u64,
    ) -> Self {
        let table_cache = TableCache::new(env.clone(), dir.clone(), filter_policy.clone(), table_cache_capacity);
        LgRepair {
            lg_id,
            dir,
            env,
            icmp,
            filter_policy,
            table_cache,
            table_candidates: Vec::new(),
            old_manifests: Vec::new(),
            stray_files: Vec::new(),
            tables: Vec::new(),
            memtable: None,
            next_file_number: 1,
            max_sequence: 0,
        }
    }

    pub fn lg_id(&self) -> LgId {
        self.lg_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn max_sequence(&self) -> SequenceNumber {
        self.max_sequence
    }

    /// Enumerates this locality group's directory, classifying entries into
    /// table candidates (to be scanned by `extract_metadata`), old
    /// descriptors (to be archived once a new one is ready), and anything
    /// else unexpected (archived too, for hygiene, but never blocks repair).
    pub fn find_files(&mut self) -> Result<()> {
        let children = match self.env.get_children(&self.dir) {
            Ok(children) => children,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        for name in children {
            let (num, file_type) = filenames::parse_file_name(&name);
            let path = self.dir.join(&name);
            match file_type {
                FileType::Table => {
                    self.table_candidates.push(num);
                    self.next_file_number = self.next_file_number.max(num + 1);
                }
                FileType::Descriptor => {
                    self.old_manifests.push(path);
                    self.next_file_number = self.next_file_number.max(num + 1);
                }
                FileType::Temp => self.stray_files.push(path),
                FileType::Current | FileType::Log | FileType::Other => {}
            }
        }
        self.table_candidates.sort_unstable();
        Ok(())
    }

    /// Scans every table candidate found by `find_files`, recording a
    /// `TableInfo` for each one that parses cleanly and archiving the rest.
    pub fn extract_metadata(&mut self) -> Result<()> {
        let candidates = std::mem::take(&mut self.table_candidates);
        for num in candidates {
            self.scan_and_register_table(num)?;
        }
        for stray in std::mem::take(&mut self.stray_files) {
            self.archive_file(&stray);
        }
        Ok(())
    }

    /// Opens, scans, and either keeps or archives one table file. Used both
    /// by `extract_metadata` (initial discovery) and `add_table_meta`
    /// (re-scanning a table repair just built).
    fn scan_and_register_table(&mut self, num: FileNum) -> Result<()> {
        let path = table_file_name(&self.dir, num);
        let size = match self.env.file_size(&path) {
            Ok(size) => size,
            Err(e) => {
                warn!(lg_id = self.lg_id, file_number = num, error = %e, "table file vanished before it could be scanned");
                return Ok(());
            }
        };

        let table = match self.table_cache.find_table(num, size) {
            Ok(table) => table,
            Err(e) => {
                warn!(lg_id = self.lg_id, file_number = num, error = %e, "table failed to open, archiving");
                self.archive_file(&path);
                return Ok(());
            }
        };

        let mut it = table.iter();
        it.seek_to_first();
        let mut smallest: Option<InternalKey> = None;
        let mut largest: Option<InternalKey> = None;
        let mut max_seq = 0u64;
        let mut parsed_any = false;

        while it.valid() {
            match parse_internal_key(it.key()) {
                Ok(parsed) => {
                    parsed_any = true;
                    max_seq = max_seq.max(parsed.sequence);
                    let mut key = InternalKey::empty();
                    key.decode_from(it.key())?;
                    if smallest.is_none() {
                        smallest = Some(key.clone());
                    }
                    largest = Some(key);
                }
                Err(e) => {
                    warn!(lg_id = self.lg_id, file_number = num, error = %e, "unparsable key in table, skipping entry");
                }
            }
            it.next();
        }
        if let Err(e) = it.status() {
            warn!(lg_id = self.lg_id, file_number = num, error = %e, "table iterator reported an error, archiving");
            self.table_cache.evict(num);
            self.archive_file(&path);
            return Ok(());
        }

        if !parsed_any || size == 0 {
            warn!(lg_id = self.lg_id, file_number = num, "table has no parsable entries, archiving");
            self.table_cache.evict(num);
            self.archive_file(&path);
            return Ok(());
        }

        self.max_sequence = self.max_sequence.max(max_seq);
        self.next_file_number = self.next_file_number.max(num + 1);
        self.tables.push(TableInfo {
            meta: FileMetaData {
                file_number: num,
                file_size: size,
                smallest: smallest.expect("parsed_any implies at least one key"),
                largest: largest.expect("parsed_any implies at least one key"),
            },
            max_sequence: max_seq,
        });
        Ok(())
    }

    pub fn has_memtable(&self) -> bool {
        matches!(&self.memtable, Some(mem) if !mem.is_empty())
    }

    /// Replays one sub-batch (already filtered to this locality group) into
    /// this LG's memtable, creating it lazily. Mutations whose sequence is
    /// not strictly greater than `max_sequence` are dropped as duplicates
    /// rather than re-applied.
    pub fn insert_memtable(&mut self, batch: &WriteBatch) -> Result<()> {
        let memtable = self
            .memtable
            .get_or_insert_with(|| MemTable::new(self.icmp.clone()));
        let mut inserter = MemTableInserter {
            memtable,
            seq: batch.sequence(),
            max_sequence: &mut self.max_sequence,
            inserted: 0,
            dropped: 0,
        };
        batch.iterate(&mut inserter)?;
        if inserter.dropped > 0 {
            info!(
                lg_id = self.lg_id,
                dropped = inserter.dropped,
                inserted = inserter.inserted,
                "dropped duplicate mutations during WAL replay"
            );
        }
        Ok(())
    }

    /// Flushes the current memtable (if any) to a new table file and folds
    /// its metadata in via `add_table_meta`. A no-op if there is nothing to
    /// flush: an empty memtable still allocates a file number here, matching
    /// `ConvertLogToTable`, but never leaves a zero-byte file behind.
    pub fn build_table_file(&mut self) -> Result<()> {
        let Some(memtable) = self.memtable.take() else {
            return Ok(());
        };
        if memtable.is_empty() {
            return Ok(());
        }

        let entries: Vec<(Vec<u8>, Vec<u8>)> = memtable
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        let file_number = self.next_file_number;
        self.next_file_number += 1;
        let path = table_file_name(&self.dir, file_number);

        let iter: Box<dyn DBIterator> = Box::new(VecIterator::new(entries));
        match crate::builder::build_table(
            &self.env,
            &path,
            self.icmp.clone(),
            self.filter_policy.clone(),
            iter,
        ) {
            Ok(Some(_)) => self.scan_and_register_table(file_number),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(lg_id = self.lg_id, file_number, error = %e, "failed to flush recovered memtable");
                Ok(())
            }
        }
    }

    pub fn archive_file(&mut self, path: &Path) {
        match filenames::archive_file(&self.env, path) {
            Ok(()) => info!(lg_id = self.lg_id, path = %path.display(), "archived"),
            Err(e) => warn!(lg_id = self.lg_id, path = %path.display(), error = %e, "failed to archive file, leaving in place"),
        }
    }

    /// Synthesizes and installs a fresh descriptor covering every retained
    /// table: write the manifest to a temp file, archive the old manifests,
    /// rename the temp file to its canonical name, then point
    /// `CURRENT` at it — in that order, so a crash at any point leaves
    /// either the old or the new descriptor fully readable, never neither.
    pub fn write_descriptor(&mut self) -> Result<()> {
        let manifest_num = self.next_file_number;
        self.next_file_number += 1;

        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.icmp.user_comparator().name());
        edit.set_log_number(0);
        edit.set_next_file_number(self.next_file_number);
        edit.set_last_sequence(self.max_sequence);
        for table in &self.tables {
            edit.add_file(0, table.meta.clone());
        }

        let mut record = Vec::new();
        edit.encode(&mut record);

        let temp_path = temp_file_name(&self.dir, manifest_num);
        let write_result = (|| -> Result<()> {
            let file = self.env.new_writable_file(&temp_path)?;
            let mut writer = LogWriter::new(file);
            writer.add_record(&record)?;
            writer.sync()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = self.env.delete_file(&temp_path);
            return Err(e);
        }

        for old in std::mem::take(&mut self.old_manifests) {
            self.archive_file(&old);
        }

        let canonical = descriptor_file_name(&self.dir, manifest_num);
        self.env.rename_file(&temp_path, &canonical)?;
        filenames::set_current_file(&self.env, &self.dir, manifest_num)?;
        info!(
            lg_id = self.lg_id,
            manifest = manifest_num,
            tables = self.tables.len(),
            last_sequence = self.max_sequence,
            "installed repaired descriptor"
        );
        Ok(())
    }
}
