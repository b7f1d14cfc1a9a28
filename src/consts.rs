/// Number of compaction levels a version tracks. Repair only ever places
/// recovered tables at level 0, but the descriptor format carries a level
/// per file and `VersionEdit` decoding rejects levels outside this range.
pub const NUM_LEVELS: usize = 7;

pub const L0_COMPACTION_TRIGGER: usize = 4;

/// Default capacity for a table cache the repairer creates for itself, when
/// the caller did not provide one. Each table is opened at most once during
/// a scan, so a small cache is enough headroom for the handful of tables
/// open concurrently during a flush/verify pair.
pub const DEFAULT_REPAIR_TABLE_CACHE_CAPACITY: u64 = 32;

/// Default locality group set used when the caller does not specify one.
pub const DEFAULT_LG_ID: crate::types::LgId = 0;
