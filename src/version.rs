//! Metadata about on-disk tables. Repair needs only the metadata shape,
//! never the full `Version`/`VersionSet`/compaction machinery a live
//! database builds on top of it.

use crate::filenames::FileNum;
use crate::format::InternalKey;
use crate::types::SequenceNumber;

/// One table's identity and key range, as recorded in a descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileMetaData {
    pub file_number: FileNum,
    pub file_size: u64,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

/// `FileMetaData` plus the highest sequence number observed while scanning
/// the table. Used only during repair, where `max_sequence`
/// feeds `last_sequence` for the synthesized descriptor; a regular
/// `Version`'s file list has no equivalent field because normal operation
/// tracks sequence numbers through the manifest instead of re-deriving them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableInfo {
    pub meta: FileMetaData,
    pub max_sequence: SequenceNumber,
}
