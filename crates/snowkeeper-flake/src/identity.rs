use crate::error::{Error, Result};
use std::fmt;

/// Largest worker id that fits the 5-bit field.
pub const MAX_WORKER_ID: u8 = 0b1_1111;
/// Largest datacenter id that fits the 5-bit field.
pub const MAX_DATACENTER_ID: u8 = 0b1_1111;

/// The `(worker_id, datacenter_id)` pair a generator stamps into every id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerIdentity {
    worker_id: u8,
    datacenter_id: u8,
}

impl WorkerIdentity {
    pub fn new(worker_id: u8, datacenter_id: u8) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(Error::InvalidWorkerId {
                worker_id,
                max: MAX_WORKER_ID,
            });
        }
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(Error::InvalidDatacenterId {
                datacenter_id,
                max: MAX_DATACENTER_ID,
            });
        }
        Ok(Self {
            worker_id,
            datacenter_id,
        })
    }

    /// Derives an identity from a registration sequence number.
    ///
    /// `worker_id = seq mod 32`, `datacenter_id = (seq div 32) mod 32`, so
    /// sequences `0..1024` map to distinct identities and later sequences
    /// wrap around.
    pub fn from_sequence(sequence: u64) -> Self {
        let slots = u64::from(MAX_WORKER_ID) + 1;
        Self {
            worker_id: (sequence % slots) as u8,
            datacenter_id: ((sequence / slots) % slots) as u8,
        }
    }

    pub fn worker_id(&self) -> u8 {
        self.worker_id
    }

    pub fn datacenter_id(&self) -> u8 {
        self.datacenter_id
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker={} datacenter={}", self.worker_id, self.datacenter_id)
    }
}
