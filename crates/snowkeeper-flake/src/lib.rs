//! Snowflake-style 63-bit id generation.
//!
//! Ids pack a 41-bit millisecond timestamp, a 5-bit datacenter id, a 5-bit
//! worker id and a 12-bit sequence. A [`Snowflake`] owns the generator state
//! for one [`WorkerIdentity`] and serializes callers behind a mutex.

mod clock;
pub mod error;
mod flake_id;
mod generator;
mod identity;
mod snowflake;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use flake_id::{FlakeId, ParseFlakeIdError, MAX_SEQUENCE, MAX_TIMESTAMP};
pub use generator::IdGenerator;
pub use identity::{WorkerIdentity, MAX_DATACENTER_ID, MAX_WORKER_ID};
pub use snowflake::{Snowflake, SnowflakeSettings, DEFAULT_EPOCH};
