//! On-disk footer layout for the simplified single-block table format (see
//! `sstable::mod` for the rationale), using fixed-width handles instead of
//! varint-packed ones: repair only ever reads a footer it just wrote or one
//! written by this same crate, so there's no forward-compatibility reason to
//! pay varint's variable width here.

use crate::error::{Error, Result};

pub const MAGIC: u64 = 0x4c47_4442_5250_5231; // "LGDBRPR1" read as bytes, big-endian-ish mnemonic
const HANDLE_SIZE: usize = 16;
pub const FOOTER_ENCODED_LENGTH: usize = 2 * HANDLE_SIZE + 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.offset.to_le_bytes());
        dst.extend_from_slice(&self.size.to_le_bytes());
    }

    fn decode(data: &[u8]) -> Self {
        let offset = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let size = u64::from_le_bytes(data[8..16].try_into().unwrap());
        BlockHandle { offset, size }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Footer {
    pub data_handle: BlockHandle,
    pub filter_handle: BlockHandle,
}

impl Footer {
    pub fn encode(&self, dst: &mut Vec<u8>) {
        self.data_handle.encode(dst);
        self.filter_handle.encode(dst);
        dst.extend_from_slice(&MAGIC.to_le_bytes());
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_ENCODED_LENGTH {
            return Err(Error::Corruption("table footer has the wrong size".into()));
        }
        let magic = u64::from_le_bytes(data[32..40].try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::Corruption("not a table file (bad magic)".into()));
        }
        Ok(Footer {
            data_handle: BlockHandle::decode(&data[0..16]),
            filter_handle: BlockHandle::decode(&data[16..32]),
        })
    }
}
