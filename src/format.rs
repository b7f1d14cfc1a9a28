//! Internal key format: `user_key ++ (sequence << 8 | kind)` as a little
//! endian u64 tag.

use crate::codec::{NumberDecoder, NumberWriter};
use crate::error::{Error, Result};
use crate::types::{SequenceNumber, ValueType, MAX_SEQUENCE_NUMBER};

pub fn pack_sequence_and_type(seq: SequenceNumber, t: ValueType) -> u64 {
    assert!(seq <= MAX_SEQUENCE_NUMBER);
    (seq << 8) | t as u64
}

fn unpack_sequence_and_type(tag: u64) -> Result<(SequenceNumber, ValueType)> {
    let kind = ValueType::try_from((tag & 0xff) as u8)?;
    Ok((tag >> 8, kind))
}

/// `(user_key, sequence, kind)`, encoded as `user_key` followed by an 8-byte
/// little-endian tag. Orders newer entries before older ones for equal user
/// keys (see [`crate::cmp::InternalKeyComparator`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn empty() -> Self {
        InternalKey { rep: Vec::new() }
    }

    pub fn new(user_key: &[u8], seq: SequenceNumber, kind: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + 8);
        rep.extend_from_slice(user_key);
        rep.write_u64_le(pack_sequence_and_type(seq, kind));
        InternalKey { rep }
    }

    pub fn is_empty(&self) -> bool {
        self.rep.is_empty()
    }

    /// Overwrites this key from an already-encoded internal-key byte string
    /// (used while replaying a table's or a record's raw bytes). Fails
    /// without mutating `self` if `data` is too short to hold the 8-byte
    /// tag.
    pub fn decode_from(&mut self, data: &[u8]) -> Result<()> {
        parse_internal_key(data)?;
        self.rep.clear();
        self.rep.extend_from_slice(data);
        Ok(())
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn sequence(&self) -> SequenceNumber {
        extract_sequence(&self.rep)
    }

    pub fn kind(&self) -> Result<ValueType> {
        // extract_tag already validated length; re-derive to surface a
        // possible bad value-type byte without panicking.
        ValueType::try_from((extract_tag(&self.rep) & 0xff) as u8)
    }
}

pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub kind: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn append_to(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(self.user_key);
        dst.write_u64_le(pack_sequence_and_type(self.sequence, self.kind));
    }
}

/// Parses a raw internal-key byte string. Used both by in-memory code and by
/// the repair table scan, where a key that fails to parse is logged and
/// skipped rather than treated as fatal.
pub fn parse_internal_key(data: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if data.len() < 8 {
        return Err(Error::Corruption(
            "internal key shorter than the 8-byte sequence/kind tag".into(),
        ));
    }
    let user_key = &data[..data.len() - 8];
    let mut tag_bytes = &data[data.len() - 8..];
    let tag = tag_bytes.decode_u64_le()?;
    let (sequence, kind) = unpack_sequence_and_type(tag)?;
    Ok(ParsedInternalKey {
        user_key,
        sequence,
        kind,
    })
}

pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    assert!(internal_key.len() >= 8);
    &internal_key[..internal_key.len() - 8]
}

pub(crate) fn extract_tag(internal_key: &[u8]) -> u64 {
    assert!(internal_key.len() >= 8);
    let mut buf = &internal_key[internal_key.len() - 8..];
    buf.decode_u64_le().expect("8 bytes available")
}

pub fn extract_sequence(internal_key: &[u8]) -> SequenceNumber {
    extract_tag(internal_key) >> 8
}
