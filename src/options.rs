//! Tunables for repair: no compaction/write-path knobs
//! (block_restart_interval, write_buffer_size, compression_type, reuse_log,
//! ...), since none of those have meaning for a repair-only entry point.
//! What's left is the owning `Env`, comparator, filter policy, info log
//! sink, an optional shared table/block cache, and the set of locality
//! groups to repair.

use std::sync::Arc;

use crate::cmp::{BitwiseComparator, Comparator};
use crate::env::posix::PosixEnv;
use crate::env::Env;
use crate::filter::FilterPolicy;
use crate::types::LgId;

/// Whether a cache handed to `Options` is owned by the caller (repair must
/// not close/evict anything beyond what it itself inserted) or owned by
/// repair (repair may tear it down when it's done). The table cache repair
/// builds internally is cheap and disposable, but a cache threaded in from a
/// live database process is not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOwnership {
    Borrowed,
    Owned,
}

/// A leveled log sink, kept as a small trait so a caller can plug in
/// `tracing`, a file, or nothing, and repair doesn't care which.
pub trait InfoLog: Send + Sync {
    fn log(&self, message: &str);
}

/// Forwards every message to the `tracing` subsystem at `info` level. This is
/// the default `info_log` (see `Options::default`), matching the rest of the
/// crate's logging (see DESIGN.md).
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingInfoLog;

impl InfoLog for TracingInfoLog {
    fn log(&self, message: &str) {
        tracing::info!("{message}");
    }
}

pub struct Options<E: Env = PosixEnv> {
    pub env: E,
    pub comparator: Arc<dyn Comparator>,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
    pub info_log: Arc<dyn InfoLog>,
    pub block_cache: Option<(Arc<dyn std::any::Any + Send + Sync>, CacheOwnership)>,
    pub table_cache_capacity: u64,
    /// Locality groups repair should look for. A database with no
    /// subdirectories matching any of these ids has its layout treated as a
    /// single implicit locality group `0`.
    pub exist_lg_list: Vec<LgId>,
    /// When set, a corrupt WAL record aborts the whole repair with an error
    /// instead of being logged and dropped.
    pub paranoid_checks: bool,
}

impl Default for Options<PosixEnv> {
    fn default() -> Self {
        Options {
            env: PosixEnv,
            comparator: Arc::new(BitwiseComparator {}),
            filter_policy: None,
            info_log: Arc::new(TracingInfoLog),
            block_cache: None,
            table_cache_capacity: crate::consts::DEFAULT_REPAIR_TABLE_CACHE_CAPACITY,
            exist_lg_list: vec![crate::consts::DEFAULT_LG_ID],
            paranoid_checks: false,
        }
    }
}
