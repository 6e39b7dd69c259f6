use jiff::Timestamp;
use thiserror::Error;

/// Errors returned by Snowflake initialization and ID generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid worker id {worker_id}; expected 0..={max}")]
    InvalidWorkerId { worker_id: u8, max: u8 },
    #[error("invalid datacenter id {datacenter_id}; expected 0..={max}")]
    InvalidDatacenterId { datacenter_id: u8, max: u8 },
    #[error("epoch is ahead of current clock time: epoch={epoch}, now={now}")]
    EpochAhead { epoch: Timestamp, now: Timestamp },
    /// The clock moved backwards and did not recover. Never retried
    /// internally; the generator state is left untouched.
    #[error("clock moved backwards by {drift_ms}ms (last={last}, now={now})")]
    ClockRegression {
        last: Timestamp,
        now: Timestamp,
        drift_ms: i64,
    },
    #[error("clock did not advance past {target} within the spin budget")]
    ClockStalled { target: Timestamp },
    #[error("overtime limit")]
    OverTimeLimit,
    #[error("timestamp out of range: {millis}ms")]
    TimestampOutOfRange { millis: i64 },
    #[error("generator is shutting down")]
    Cancelled,
    #[error("generator state lock is poisoned")]
    StatePoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
