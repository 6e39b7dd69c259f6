use crate::error::{Error, Result};
use crate::identity::WorkerIdentity;
use jiff::Timestamp;
use modular_bitfield::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest elapsed-millisecond value the 41-bit timestamp field can hold.
pub const MAX_TIMESTAMP: u64 = (1_u64 << 41) - 1;
/// Largest per-millisecond sequence number.
pub const MAX_SEQUENCE: u16 = (1_u16 << 12) - 1;

const SEQUENCE_SHIFT: u32 = 0;
const WORKER_ID_SHIFT: u32 = 12;
const DATACENTER_ID_SHIFT: u32 = 17;
const TIMESTAMP_SHIFT: u32 = 22;

/// A 63-bit, time-ordered identifier.
///
/// Fields are laid out from the least significant bit upwards, so the `u64`
/// value equals
/// `(timestamp << 22) | (datacenter_id << 17) | (worker_id << 12) | sequence`
/// and the sign bit is always zero. This layout is a durable contract:
/// identifiers issued under it sort by time.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlakeId {
    /// 12 bits for sequence number (resets every millisecond).
    pub sequence: B12,
    /// 5 bits for worker ID.
    pub worker_id: B5,
    /// 5 bits for datacenter ID.
    pub datacenter_id: B5,
    /// 41 bits for timestamp (milliseconds since a custom epoch).
    pub timestamp: B41,
    #[skip]
    __: B1,
}

impl FlakeId {
    /// Packs the fields into an id, rejecting values outside their bit budget.
    pub fn compose(timestamp: u64, identity: WorkerIdentity, sequence: u16) -> Result<Self> {
        if timestamp > MAX_TIMESTAMP {
            return Err(Error::OverTimeLimit);
        }
        debug_assert!(sequence <= MAX_SEQUENCE);

        Ok(Self::new()
            .with_timestamp(timestamp)
            .with_datacenter_id(identity.datacenter_id())
            .with_worker_id(identity.worker_id())
            .with_sequence(sequence & MAX_SEQUENCE))
    }

    /// The identity of the generator that issued this id.
    pub fn identity(&self) -> WorkerIdentity {
        // both fields are 5 bits wide, so the derivation cannot wrap
        WorkerIdentity::from_sequence(
            u64::from(self.worker_id()) | (u64::from(self.datacenter_id()) << 5),
        )
    }

    /// Wall-clock instant encoded in the timestamp field, given the epoch the
    /// issuing generator was configured with.
    pub fn timestamp_at(&self, epoch: Timestamp) -> Result<Timestamp> {
        let millis = epoch.as_millisecond() + self.timestamp() as i64;
        Timestamp::from_millisecond(millis).map_err(|_| Error::TimestampOutOfRange { millis })
    }

    pub fn to_u64(self) -> u64 {
        u64::from_le_bytes(self.into_bytes())
    }

    /// The id as a signed integer, for stores that only have `BIGINT`.
    pub fn to_i64(self) -> i64 {
        (self.to_u64() & i64::MAX as u64) as i64
    }

    /// Rebuilds the integer value from the fields with explicit shifts.
    fn packed(&self) -> u64 {
        (self.timestamp() << TIMESTAMP_SHIFT)
            | (u64::from(self.datacenter_id()) << DATACENTER_ID_SHIFT)
            | (u64::from(self.worker_id()) << WORKER_ID_SHIFT)
            | (u64::from(self.sequence()) << SEQUENCE_SHIFT)
    }
}

impl PartialOrd for FlakeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FlakeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_u64().cmp(&other.to_u64())
    }
}

impl fmt::Debug for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakeId")
            .field("timestamp", &self.timestamp())
            .field("datacenter_id", &self.datacenter_id())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

impl fmt::Display for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.packed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFlakeIdError {
    #[error("not a decimal integer: {0}")]
    InvalidDigit(String),
    #[error("sign bit is set: {0}")]
    SignBitSet(u64),
}

impl FromStr for FlakeId {
    type Err = ParseFlakeIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value: u64 = s
            .parse()
            .map_err(|_| ParseFlakeIdError::InvalidDigit(s.to_string()))?;
        Self::try_from(value)
    }
}

impl TryFrom<i64> for FlakeId {
    type Error = ParseFlakeIdError;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        Self::try_from(value as u64)
    }
}

impl TryFrom<u64> for FlakeId {
    type Error = ParseFlakeIdError;

    fn try_from(value: u64) -> std::result::Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            return Err(ParseFlakeIdError::SignBitSet(value));
        }
        Ok(Self::from_bytes(value.to_le_bytes()))
    }
}
