//! Top-level repair coordinator. Owns the shared WAL stream and fans each
//! record out to a per-locality-group [`LgRepair`], generalizing a
//! single-database recovery shape to a `lg_id -> LgRepair` map.

pub mod lg_repair;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, info_span, warn};

use crate::cmp::InternalKeyComparator;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::filenames::{self, log_file_name, FileNum, FileType};
use crate::log::LogReader;
use crate::options::Options;
use crate::types::{LgId, SequenceNumber};
use crate::write_batch::{separate_locality_group, WriteBatch};

use lg_repair::LgRepair;

/// `Ok` if a usable descriptor was installed for every LG, otherwise the
/// first failing LG's status. `per_lg` lets a caller see partial results
/// even when `result` is an error, since every LG is attempted regardless
/// of an earlier one's failure.
pub struct RepairSummary {
    pub result: Result<()>,
    pub per_lg: BTreeMap<LgId, Result<()>>,
    pub recovered_tables: usize,
    pub recovered_bytes: u64,
}

struct DbRepair<E: Env> {
    dbname: PathBuf,
    env: E,
    icmp: InternalKeyComparator,
    repairers: BTreeMap<LgId, LgRepair<E>>,
    log_files: Vec<FileNum>,
    log_number: FileNum,
    last_sequence: SequenceNumber,
    paranoid_checks: bool,
}

impl<E: Env> DbRepair<E> {
    fn new(dbname: &Path, options: &Options<E>) -> Self {
        let icmp = InternalKeyComparator::new(options.comparator.clone());
        let lg_ids = if options.exist_lg_list.is_empty() {
            vec![crate::consts::DEFAULT_LG_ID]
        } else {
            options.exist_lg_list.clone()
        };

        let mut repairers = BTreeMap::new();
        for lg_id in lg_ids {
            let dir = filenames::lg_dir_name(dbname, lg_id);
            repairers.insert(
                lg_id,
                LgRepair::new(
                    lg_id,
                    dir,
                    options.env.clone(),
                    std::sync::Arc::new(icmp.clone()),
                    options.filter_policy.clone(),
                    options.table_cache_capacity,
                ),
            );
        }

        DbRepair {
            dbname: dbname.to_path_buf(),
            env: options.env.clone(),
            icmp,
            repairers,
            log_files: Vec::new(),
            log_number: 1,
            last_sequence: 0,
            paranoid_checks: options.paranoid_checks,
        }
    }

    /// Enumerates the root directory for WAL files, then asks every LG to
    /// enumerate its own subdirectory.
    fn find_files(&mut self) -> Result<()> {
        let children = self.env.get_children(&self.dbname)?;
        if children.is_empty() {
            return Err(Error::NotFound(format!(
                "{} contains no files",
                self.dbname.display()
            )));
        }

        for name in &children {
            let (num, file_type) = filenames::parse_file_name(name);
            if file_type == FileType::Log {
                self.log_files.push(num);
                self.log_number = self.log_number.max(num + 1);
            }
        }
        self.log_files.sort_unstable();

        for repairer in self.repairers.values_mut() {
            repairer.find_files()?;
        }
        Ok(())
    }

    /// Scans every LG's tables, aggregating the global `last_sequence`.
    fn extract_metadata(&mut self) -> Result<()> {
        for repairer in self.repairers.values_mut() {
            repairer.extract_metadata()?;
            self.last_sequence = self.last_sequence.max(repairer.max_sequence());
        }
        Ok(())
    }

    /// Replays every WAL in file-number order, splitting each record across
    /// LGs and flushing each LG's memtable once the logs are exhausted.
    /// Stops and returns the first error if `paranoid_checks` is set and a
    /// WAL turns out to be corrupt; otherwise corrupt records are logged and
    /// skipped, one log at a time.
    fn convert_logs(&mut self) -> Result<()> {
        let last_sequence_at_start = self.last_sequence;
        let single_lg = self.repairers.len() == 1;
        let only_lg_id = single_lg.then(|| *self.repairers.keys().next().unwrap());

        for &log_num in &self.log_files.clone() {
            let span = info_span!("convert_log", log_number = log_num);
            let _enter = span.enter();
            self.convert_one_log(log_num, last_sequence_at_start, only_lg_id)?;
        }
        Ok(())
    }

    fn convert_one_log(
        &mut self,
        log_num: FileNum,
        last_sequence_at_start: SequenceNumber,
        only_lg_id: Option<LgId>,
    ) -> Result<()> {
        let path = log_file_name(&self.dbname, log_num);
        let file = match self.env.new_sequential_file(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "failed to open WAL for replay, skipping");
                return Ok(());
            }
        };

        let paranoid = self.paranoid_checks;
        let mut dropped_bytes = 0usize;
        {
            let reporter: crate::log::Reporter = Box::new(|bytes, err| {
                warn!(bytes, error = %err, "dropping corrupt WAL record");
            });
            let mut reader = LogReader::new(file, paranoid, (!paranoid).then_some(reporter));

            loop {
                let record = match reader.read_record() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(e) => {
                        if paranoid {
                            return Err(e);
                        }
                        warn!(error = %e, "WAL reader reported a fatal error, stopping this log");
                        break;
                    }
                };

                if record.len() < 12 {
                    if paranoid {
                        return Err(Error::Corruption(
                            "WAL record shorter than batch header".into(),
                        ));
                    }
                    dropped_bytes += record.len();
                    warn!(bytes = record.len(), "WAL record shorter than batch header");
                    continue;
                }

                let mut batch = WriteBatch::new();
                if let Err(e) = batch.set_contents(&record) {
                    if paranoid {
                        return Err(e);
                    }
                    warn!(error = %e, "malformed write batch, skipping record");
                    continue;
                }

                let sequence = batch.sequence();
                let count = batch.count() as SequenceNumber;
                if count == 0 {
                    continue;
                }
                let last_in_batch = sequence + count - 1;

                if last_in_batch <= last_sequence_at_start {
                    info!(sequence, count, "dropping duplicate record already covered by a surviving table");
                    continue;
                }

                // last_sequence tracks "already seen", not "successfully
                // persisted" -- advance it even if a per-LG insert below fails.
                self.last_sequence = self.last_sequence.max(last_in_batch);

                if let Some(lg_id) = only_lg_id {
                    let repairer = self.repairers.get_mut(&lg_id).expect("single LG present");
                    if let Err(e) = repairer.insert_memtable(&batch) {
                        warn!(lg_id, error = %e, "failed to replay batch into memtable");
                    }
                    continue;
                }

                let split = match separate_locality_group(&batch) {
                    Ok(split) => split,
                    Err(e) => {
                        warn!(error = %e, "failed to split batch across locality groups");
                        continue;
                    }
                };
                for (lg_id, sub_batch) in split {
                    if sub_batch.count() == 0 {
                        continue;
                    }
                    let Some(repairer) = self.repairers.get_mut(&lg_id) else {
                        warn!(lg_id, "record tagged an unknown locality group, dropping its mutations");
                        continue;
                    };
                    if let Err(e) = repairer.insert_memtable(&sub_batch) {
                        warn!(lg_id, error = %e, "failed to replay batch into memtable");
                    }
                }
            }
        }

        for (lg_id, repairer) in self.repairers.iter_mut() {
            if !repairer.has_memtable() {
                continue;
            }
            if let Err(e) = repairer.build_table_file() {
                warn!(lg_id, log_number = log_num, error = %e, "failed to flush recovered memtable to a table");
            }
        }

        if dropped_bytes > 0 {
            info!(log_number = log_num, dropped_bytes, "finished replaying WAL with some corrupt records");
        }
        self.archive_log(&path);
        Ok(())
    }

    fn archive_log(&mut self, path: &Path) {
        match filenames::archive_file(&self.env, path) {
            Ok(()) => info!(path = %path.display(), "archived WAL"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to archive WAL, leaving in place"),
        }
    }

    /// Writes every LG's synthesized descriptor. Every LG is attempted
    /// regardless of an earlier one's failure.
    fn write_descriptors(&mut self) -> BTreeMap<LgId, Result<()>> {
        let mut results = BTreeMap::new();
        for (lg_id, repairer) in self.repairers.iter_mut() {
            let span = info_span!("write_descriptor", lg_id = lg_id);
            let _enter = span.enter();
            results.insert(*lg_id, repairer.write_descriptor());
        }
        results
    }
}

/// Rebuilds a consistent descriptor for every locality group in `dbname`
/// from surviving WALs and tables. The repair tool's single public entry
/// point.
pub fn repair<E: Env>(dbname: &Path, options: &Options<E>) -> RepairSummary {
    let span = info_span!("repair", dbname = %dbname.display());
    let _enter = span.enter();

    let mut repairer = DbRepair::new(dbname, options);

    if let Err(e) = repairer.find_files() {
        return RepairSummary {
            result: Err(e),
            per_lg: BTreeMap::new(),
            recovered_tables: 0,
            recovered_bytes: 0,
        };
    }

    if let Err(e) = repairer.extract_metadata() {
        return RepairSummary {
            result: Err(e),
            per_lg: BTreeMap::new(),
            recovered_tables: 0,
            recovered_bytes: 0,
        };
    }

    if let Err(e) = repairer.convert_logs() {
        return RepairSummary {
            result: Err(e),
            per_lg: BTreeMap::new(),
            recovered_tables: 0,
            recovered_bytes: 0,
        };
    }

    let per_lg = repairer.write_descriptors();

    let recovered_tables: usize = repairer.repairers.values().map(|r| r.tables().len()).sum();
    let recovered_bytes: u64 = repairer
        .repairers
        .values()
        .flat_map(|r| r.tables())
        .map(|t| t.meta.file_size)
        .sum();

    let first_failure = per_lg
        .iter()
        .find(|(_, res)| res.is_err())
        .map(|(lg_id, res)| {
            let Err(e) = res else { unreachable!() };
            let _ = lg_id;
            Error::Corruption(e.to_string())
        });

    info!(
        recovered_tables,
        recovered_bytes,
        lgs = per_lg.len(),
        next_log_number = repairer.log_number,
        "repair finished"
    );

    RepairSummary {
        result: match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        },
        per_lg,
        recovered_tables,
        recovered_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmp::BitwiseComparator;
    use crate::env::posix::PosixEnv;
    use crate::env::Env as _;
    use crate::filenames::{log_file_name, table_file_name};
    use crate::log::LogWriter;
    use crate::options::Options;
    use crate::sstable::TableBuilder;
    use crate::types::LgId;
    use std::sync::Arc;

    fn opts_for(lgs: Vec<LgId>) -> Options<PosixEnv> {
        Options {
            env: PosixEnv,
            comparator: Arc::new(BitwiseComparator {}),
            filter_policy: None,
            info_log: Arc::new(crate::options::TracingInfoLog),
            block_cache: None,
            table_cache_capacity: 8,
            exist_lg_list: lgs,
            paranoid_checks: false,
        }
    }

    fn write_batch_record(seq: u64, puts: &[(u32, &[u8], &[u8])]) -> Vec<u8> {
        let mut batch = WriteBatch::new();
        batch.set_sequence(seq);
        for (lg, k, v) in puts {
            batch.put(*lg, k, v);
        }
        batch.contents().to_vec()
    }

    #[test]
    fn single_lg_lost_manifest_one_table_no_logs() {
        let dir = tempfile::tempdir().unwrap();
        let lg_dir = dir.path().join("0");
        std::fs::create_dir_all(&lg_dir).unwrap();
        let env = PosixEnv;

        let path = table_file_name(&lg_dir, 1);
        let file = env.new_writable_file(&path).unwrap();
        let mut builder = TableBuilder::new(file, None);
        builder.add(
            crate::format::InternalKey::new(b"a", 5, crate::types::ValueType::Value).encode(),
            b"1",
        );
        builder.add(
            crate::format::InternalKey::new(b"b", 6, crate::types::ValueType::Value).encode(),
            b"2",
        );
        builder.finish().unwrap();

        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        assert_eq!(summary.recovered_tables, 1);

        let manifest = std::fs::read_to_string(lg_dir.join("CURRENT")).unwrap();
        assert!(manifest.starts_with("MANIFEST-"));
    }

    #[test]
    fn single_lg_wal_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        let env = PosixEnv;

        let log_path = log_file_name(dir.path(), 1);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            let record = write_batch_record(10, &[(0, b"k", b"v")]);
            writer.add_record(&record).unwrap();
            writer.sync().unwrap();
        }

        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        assert_eq!(summary.recovered_tables, 1);
        assert!(!env.file_exists(&log_path));
        assert!(env.file_exists(&dir.path().join("lost").join(log_path.file_name().unwrap())));
    }

    #[test]
    fn duplicate_record_suppression() {
        let dir = tempfile::tempdir().unwrap();
        let lg_dir = dir.path().join("0");
        std::fs::create_dir_all(&lg_dir).unwrap();
        let env = PosixEnv;

        // A surviving table already covers sequence up to 100.
        let path = table_file_name(&lg_dir, 1);
        let file = env.new_writable_file(&path).unwrap();
        let mut builder = TableBuilder::new(file, None);
        builder.add(
            crate::format::InternalKey::new(b"z", 100, crate::types::ValueType::Value).encode(),
            b"zz",
        );
        builder.finish().unwrap();

        let log_path = log_file_name(dir.path(), 5);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            // seq=50, count=3 -> last_sequence=52, all <= 100, dropped.
            let mut dup_batch = WriteBatch::new();
            dup_batch.set_sequence(50);
            dup_batch.put(0, b"d1", b"x");
            dup_batch.put(0, b"d2", b"x");
            dup_batch.put(0, b"d3", b"x");
            writer.add_record(dup_batch.contents()).unwrap();

            let fresh = write_batch_record(200, &[(0, b"fresh", b"val")]);
            writer.add_record(&fresh).unwrap();
            writer.sync().unwrap();
        }

        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        // Original table + one new table holding only the seq=200 mutation.
        assert_eq!(summary.recovered_tables, 2);
    }

    #[test]
    fn corrupt_mid_wal_still_replays_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        let env = PosixEnv;

        let log_path = log_file_name(dir.path(), 1);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            let a = write_batch_record(10, &[(0, b"a", b"1")]);
            writer.add_record(&a).unwrap();
            writer.add_record(b"short").unwrap();
            let c = write_batch_record(12, &[(0, b"c", b"3")]);
            writer.add_record(&c).unwrap();
            writer.sync().unwrap();
        }

        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        assert_eq!(summary.recovered_tables, 1);
    }

    #[test]
    fn multi_lg_split_routes_each_key_to_its_own_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        std::fs::create_dir_all(dir.path().join("1")).unwrap();
        let env = PosixEnv;

        let log_path = log_file_name(dir.path(), 1);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            let mut batch = WriteBatch::new();
            batch.set_sequence(20);
            batch.put(0, b"k0", b"v0");
            batch.put(1, b"k1", b"v1");
            writer.add_record(batch.contents()).unwrap();
            writer.sync().unwrap();
        }

        let options = opts_for(vec![0, 1]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        assert_eq!(summary.recovered_tables, 2);
        for lg in [0u32, 1u32] {
            let manifest = std::fs::read_to_string(dir.path().join(lg.to_string()).join("CURRENT")).unwrap();
            assert!(manifest.starts_with("MANIFEST-"));
        }
    }

    #[test]
    fn empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(matches!(summary.result, Err(Error::NotFound(_))));
    }

    #[test]
    fn overwrite_of_same_key_does_not_panic_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        let env = PosixEnv;

        let log_path = log_file_name(dir.path(), 1);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            // One batch overwrites the same user key twice: the memtable
            // holds k@11 and k@10, which the internal-key comparator orders
            // newest-first (bytewise-descending tag for equal user keys).
            let record = write_batch_record(10, &[(0, b"k", b"v1"), (0, b"k", b"v2")]);
            writer.add_record(&record).unwrap();
            writer.sync().unwrap();
        }

        let options = opts_for(vec![0]);
        let summary = repair(dir.path(), &options);
        assert!(summary.result.is_ok(), "{:?}", summary.result);
        assert_eq!(summary.recovered_tables, 1);
    }

    #[test]
    fn paranoid_checks_aborts_on_corrupt_wal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("0")).unwrap();
        let env = PosixEnv;

        let log_path = log_file_name(dir.path(), 1);
        {
            let file = env.new_writable_file(&log_path).unwrap();
            let mut writer = LogWriter::new(file);
            let a = write_batch_record(10, &[(0, b"a", b"1")]);
            writer.add_record(&a).unwrap();
            writer.add_record(b"short").unwrap();
            writer.sync().unwrap();
        }

        let mut options = opts_for(vec![0]);
        options.paranoid_checks = true;
        let summary = repair(dir.path(), &options);
        assert!(matches!(summary.result, Err(Error::Corruption(_))));
    }
}
