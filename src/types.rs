use crate::error::Error;

pub type SequenceNumber = u64;
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Identifies a locality group (a partition of the key space stored as an
/// independent sub-LSM under `dbname/<lg_id>/`).
pub type LgId = u32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl TryFrom<u8> for ValueType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            _ => Err(Error::Corruption(format!("unknown value type tag {value}"))),
        }
    }
}
