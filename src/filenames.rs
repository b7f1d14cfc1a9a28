//! File naming and classification for the on-disk layout:
//!
//!   root:       CURRENT, `<n>.log` (hex), `MANIFEST-<n>`, `<lg_id>/`
//!   per-LG dir: CURRENT, `<n>.sst` (decimal), `MANIFEST-<n>`, `lost/`

use std::path::{Path, PathBuf};

use crate::env::{write_string_to_file, Env};
use crate::error::{Error, Result};
use crate::types::LgId;

pub type FileNum = u64;

const CURRENT: &str = "CURRENT";
const LOST_DIR: &str = "lost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Log,
    Table,
    Descriptor,
    Current,
    Temp,
    Other,
}

/// Classifies a single file name (no path separators). Unknown names
/// classify as `Other` rather than erroring, so discovery tolerates
/// concurrent or stale artifacts.
pub fn parse_file_name(name: &str) -> (FileNum, FileType) {
    if name == CURRENT {
        return (0, FileType::Current);
    }
    if let Some(rest) = name.strip_prefix("MANIFEST-") {
        return match FileNum::from_str_radix(rest, 10) {
            Ok(num) => (num, FileType::Descriptor),
            Err(_) => (0, FileType::Other),
        };
    }
    if let Some((stem, ext)) = name.rsplit_once('.') {
        let radix = if ext == "log" { 16 } else { 10 };
        if let Ok(num) = FileNum::from_str_radix(stem, radix) {
            return match ext {
                "log" => (num, FileType::Log),
                "sst" => (num, FileType::Table),
                "dbtmp" => (num, FileType::Temp),
                _ => (0, FileType::Other),
            };
        }
    }
    (0, FileType::Other)
}

pub fn log_file_name(dbname: &Path, num: FileNum) -> PathBuf {
    dbname.join(format!("{:016x}.log", num))
}

pub fn table_file_name(lg_dir: &Path, num: FileNum) -> PathBuf {
    assert!(num > 0);
    lg_dir.join(format!("{:06}.sst", num))
}

pub fn descriptor_file_name(dir: &Path, num: FileNum) -> PathBuf {
    dir.join(format!("MANIFEST-{:06}", num))
}

pub fn temp_file_name(dir: &Path, num: FileNum) -> PathBuf {
    dir.join(format!("{:06}.dbtmp", num))
}

pub fn current_file_name(dir: &Path) -> PathBuf {
    dir.join(CURRENT)
}

pub fn lg_dir_name(dbname: &Path, lg_id: LgId) -> PathBuf {
    dbname.join(lg_id.to_string())
}

pub fn lost_dir_name(dir: &Path) -> PathBuf {
    dir.join(LOST_DIR)
}

/// Points `CURRENT` at `descriptor_num`'s manifest: write the name to a temp
/// file, then rename over `CURRENT`. The rename is the atomic commit point.
pub fn set_current_file<E: Env>(env: &E, dir: &Path, descriptor_num: FileNum) -> Result<()> {
    let manifest_name = descriptor_file_name(dir, descriptor_num);
    let basename = manifest_name
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidArgument("non-utf8 manifest name".into()))?;
    let mut content = basename.to_string();
    content.push('\n');

    let tmp = temp_file_name(dir, descriptor_num);
    write_string_to_file(env, content.as_bytes(), &tmp, false)?;
    env.rename_file(&tmp, &current_file_name(dir))
}

/// Moves `path` into `<parent>/lost/<basename>`, creating `lost/` if needed.
/// Idempotent: a second archival of the same basename overwrites, since file
/// numbers are unique per scope and a name only ever gets archived once.
pub fn archive_file<E: Env>(env: &E, path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidArgument("archived path has no parent".into()))?;
    let basename = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument("archived path has no file name".into()))?;
    let lost_dir = lost_dir_name(parent);
    env.create_dir_if_missing(&lost_dir)?;
    env.rename_file(path, &lost_dir.join(basename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_names() {
        assert_eq!(parse_file_name("CURRENT"), (0, FileType::Current));
        assert_eq!(
            parse_file_name("MANIFEST-000007"),
            (7, FileType::Descriptor)
        );
        assert_eq!(parse_file_name("0000000000000001.log"), (1, FileType::Log));
        assert_eq!(parse_file_name("000042.sst"), (42, FileType::Table));
        assert_eq!(parse_file_name("000003.dbtmp"), (3, FileType::Temp));
    }

    #[test]
    fn unknown_names_are_other() {
        assert_eq!(parse_file_name("LOG").1, FileType::Other);
        assert_eq!(parse_file_name("random.txt").1, FileType::Other);
        assert_eq!(parse_file_name("MANIFEST-bogus").1, FileType::Other);
    }
}
