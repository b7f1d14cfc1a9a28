//! Repair configuration, loadable from a TOML file or built programmatically.
//!
//! [`Options`] itself carries the non-serializable collaborators (the `Env`,
//! comparator, filter policy) that a config file has no business naming, so
//! `RepairConfig::into_options` is the seam between the two.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::env::posix::PosixEnv;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::types::LgId;

fn default_table_cache_capacity() -> u64 {
    crate::consts::DEFAULT_REPAIR_TABLE_CACHE_CAPACITY
}

/// Everything [`crate::repair::repair`] needs to know that isn't a live
/// collaborator object: where the database lives, which locality groups to
/// look for, and a couple of tunables. Deserializes from TOML:
///
/// ```toml
/// db = "/var/lib/mydb"
/// lg = [0, 1, 2]
/// table_cache_capacity = 64
/// paranoid_checks = false
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RepairConfig {
    pub db: PathBuf,
    #[serde(default)]
    pub lg: Vec<LgId>,
    #[serde(default = "default_table_cache_capacity")]
    pub table_cache_capacity: u64,
    #[serde(default)]
    pub paranoid_checks: bool,
}

impl RepairConfig {
    pub fn new(db: impl Into<PathBuf>) -> Self {
        RepairConfig {
            db: db.into(),
            lg: Vec::new(),
            table_cache_capacity: default_table_cache_capacity(),
            paranoid_checks: false,
        }
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| Error::InvalidArgument(format!("invalid config {}: {e}", path.display())))
    }

    /// Builds the [`Options`] repair actually runs with, layering this
    /// config's tunables over engine defaults (comparator, filter policy,
    /// info log) a config file has no way to express.
    pub fn into_options(self) -> Options<PosixEnv> {
        let mut options = Options::default();
        if !self.lg.is_empty() {
            options.exist_lg_list = self.lg;
        }
        options.table_cache_capacity = self.table_cache_capacity;
        options.paranoid_checks = self.paranoid_checks;
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg: RepairConfig = toml::from_str(r#"db = "/tmp/mydb""#).unwrap();
        assert_eq!(cfg.db, PathBuf::from("/tmp/mydb"));
        assert!(cfg.lg.is_empty());
        assert_eq!(cfg.table_cache_capacity, default_table_cache_capacity());
        assert!(!cfg.paranoid_checks);
    }

    #[test]
    fn parses_full_config() {
        let cfg: RepairConfig = toml::from_str(
            r#"
            db = "/var/lib/mydb"
            lg = [0, 1, 2]
            table_cache_capacity = 64
            paranoid_checks = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.lg, vec![0, 1, 2]);
        assert_eq!(cfg.table_cache_capacity, 64);
        assert!(cfg.paranoid_checks);
    }

    #[test]
    fn rejects_missing_db() {
        let err = toml::from_str::<RepairConfig>("lg = [0]").unwrap_err();
        let _ = err;
    }

    #[test]
    fn into_options_overrides_lg_list_when_present() {
        let cfg = RepairConfig {
            db: PathBuf::from("/tmp/mydb"),
            lg: vec![3, 4],
            table_cache_capacity: 16,
            paranoid_checks: true,
        };
        let options = cfg.into_options();
        assert_eq!(options.exist_lg_list, vec![3, 4]);
        assert_eq!(options.table_cache_capacity, 16);
        assert!(options.paranoid_checks);
    }
}
