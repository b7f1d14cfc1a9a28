//! Descriptor record format: tag constants and a varint-tagged record
//! layout, trimmed to the fields repair actually produces. Repair
//! synthesizes one fresh edit per locality group and never needs compaction
//! pointers or deleted-file records, since it never reads an old descriptor
//! to begin with.

use crate::codec::{
    put_length_prefixed_slice, put_varint32, put_varint64, DecodeVarint, VarLengthSliceReader,
};
use crate::error::{Error, Result};
use crate::filenames::FileNum;
use crate::format::InternalKey;
use crate::types::SequenceNumber;
use crate::version::FileMetaData;

const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_NEW_FILE: u32 = 7;

#[derive(Clone, Debug, Default)]
pub struct VersionEdit {
    pub comparator: Option<String>,
    pub log_number: Option<FileNum>,
    pub next_file_number: Option<FileNum>,
    pub last_sequence: Option<SequenceNumber>,
    /// `(level, meta)` pairs. Repair always uses level 0.
    pub new_files: Vec<(u32, FileMetaData)>,
}

impl VersionEdit {
    pub fn new() -> Self {
        VersionEdit::default()
    }

    pub fn set_comparator_name(&mut self, name: &str) {
        self.comparator = Some(name.to_string());
    }

    pub fn set_log_number(&mut self, num: FileNum) {
        self.log_number = Some(num);
    }

    pub fn set_next_file_number(&mut self, num: FileNum) {
        self.next_file_number = Some(num);
    }

    pub fn set_last_sequence(&mut self, seq: SequenceNumber) {
        self.last_sequence = Some(seq);
    }

    pub fn add_file(&mut self, level: u32, meta: FileMetaData) {
        self.new_files.push((level, meta));
    }

    pub fn encode(&self, dst: &mut Vec<u8>) {
        if let Some(name) = &self.comparator {
            put_varint32(dst, TAG_COMPARATOR);
            put_length_prefixed_slice(dst, name.as_bytes());
        }
        if let Some(num) = self.log_number {
            put_varint32(dst, TAG_LOG_NUMBER);
            put_varint64(dst, num);
        }
        if let Some(num) = self.next_file_number {
            put_varint32(dst, TAG_NEXT_FILE_NUMBER);
            put_varint64(dst, num);
        }
        if let Some(seq) = self.last_sequence {
            put_varint32(dst, TAG_LAST_SEQUENCE);
            put_varint64(dst, seq);
        }
        for (level, meta) in &self.new_files {
            put_varint32(dst, TAG_NEW_FILE);
            put_varint32(dst, *level);
            put_varint64(dst, meta.file_number);
            put_varint64(dst, meta.file_size);
            put_length_prefixed_slice(dst, meta.smallest.encode());
            put_length_prefixed_slice(dst, meta.largest.encode());
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::new();
        let mut input: &[u8] = data;

        while !input.is_empty() {
            let tag = input.decode_varint32()?;
            match tag {
                TAG_COMPARATOR => {
                    let name = input.get_length_prefixed_slice()?;
                    edit.comparator = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| Error::Corruption("comparator name not utf-8".into()))?,
                    );
                }
                TAG_LOG_NUMBER => edit.log_number = Some(input.decode_varint64()?),
                TAG_NEXT_FILE_NUMBER => edit.next_file_number = Some(input.decode_varint64()?),
                TAG_LAST_SEQUENCE => edit.last_sequence = Some(input.decode_varint64()?),
                TAG_NEW_FILE => {
                    let level = input.decode_varint32()?;
                    let file_number = input.decode_varint64()?;
                    let file_size = input.decode_varint64()?;
                    let smallest_bytes = input.get_length_prefixed_slice()?;
                    let largest_bytes = input.get_length_prefixed_slice()?;
                    let mut smallest = InternalKey::empty();
                    smallest.decode_from(smallest_bytes)?;
                    let mut largest = InternalKey::empty();
                    largest.decode_from(largest_bytes)?;
                    edit.new_files.push((
                        level,
                        FileMetaData {
                            file_number,
                            file_size,
                            smallest,
                            largest,
                        },
                    ));
                }
                other => {
                    return Err(Error::Corruption(format!(
                        "unknown version edit tag {other}"
                    )))
                }
            }
        }
        Ok(edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn encode_decode_round_trip() {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name("leveldb.BytewiseComparator");
        edit.set_log_number(0);
        edit.set_next_file_number(42);
        edit.set_last_sequence(1000);
        edit.add_file(
            0,
            FileMetaData {
                file_number: 7,
                file_size: 4096,
                smallest: InternalKey::new(b"a", 1, ValueType::Value),
                largest: InternalKey::new(b"z", 999, ValueType::Value),
            },
        );

        let mut bytes = Vec::new();
        edit.encode(&mut bytes);
        let decoded = VersionEdit::decode(&bytes).unwrap();

        assert_eq!(decoded.comparator.as_deref(), Some("leveldb.BytewiseComparator"));
        assert_eq!(decoded.log_number, Some(0));
        assert_eq!(decoded.next_file_number, Some(42));
        assert_eq!(decoded.last_sequence, Some(1000));
        assert_eq!(decoded.new_files.len(), 1);
        assert_eq!(decoded.new_files[0].1.file_number, 7);
    }

    #[test]
    fn unknown_tag_is_corruption() {
        let mut bytes = Vec::new();
        put_varint32(&mut bytes, 99);
        assert!(VersionEdit::decode(&bytes).is_err());
    }
}
