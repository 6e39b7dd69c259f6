use crate::{
    clock::{Clock, SystemClock},
    error::{Error, Result},
    flake_id::{FlakeId, MAX_SEQUENCE, MAX_TIMESTAMP},
    identity::WorkerIdentity,
};
use jiff::Timestamp;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

/// 2010-11-04T01:42:54.657Z, the epoch of the original Twitter snowflake.
pub const DEFAULT_EPOCH: Timestamp = Timestamp::constant(1_288_834_974, 657_000_000);

/// Configures a Snowflake generator instance.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct SnowflakeSettings {
    /// The identity allocated to this process.
    pub identity: WorkerIdentity,
    /// Custom epoch used as the zero point for the 41-bit timestamp field.
    #[builder(default = DEFAULT_EPOCH)]
    pub start_epoch: Timestamp,
    /// Largest backward clock jump that is waited out instead of rejected.
    #[builder(default = Duration::from_millis(5))]
    pub max_backward_drift: Duration,
    /// How many times the clock is re-read after waiting out a regression.
    #[builder(default = 3)]
    pub drift_recheck_limit: u32,
    /// Upper bound on the busy-wait after the sequence wraps.
    #[builder(default = Duration::from_millis(100))]
    pub spin_budget: Duration,
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_timestamp: Option<i64>,
    sequence: u16,
}

/// Snowflake ID generator.
///
/// Every call to [`Snowflake::next_id`] holds the state lock for its whole
/// duration, so concurrent callers are serialized. State is only written once
/// the new id has been fully computed; a failed call leaves it untouched.
pub struct Snowflake<C: Clock> {
    settings: SnowflakeSettings,
    clock: C,
    shutdown: CancellationToken,
    state: Mutex<GeneratorState>,
}

impl Snowflake<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(settings: SnowflakeSettings) -> Result<Self> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> Snowflake<C> {
    pub fn with_clock(settings: SnowflakeSettings, clock: C) -> Result<Self> {
        let now = clock.now();
        if settings.start_epoch > now {
            return Err(Error::EpochAhead {
                epoch: settings.start_epoch,
                now,
            });
        }

        Ok(Self {
            settings,
            clock,
            shutdown: CancellationToken::new(),
            state: Mutex::new(GeneratorState::default()),
        })
    }

    /// Ties waits inside the generator to `shutdown`. Once it is cancelled,
    /// calls that would have to wait for the clock fail with
    /// [`Error::Cancelled`].
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.settings.identity
    }

    pub fn epoch(&self) -> Timestamp {
        self.settings.start_epoch
    }

    /// The wall-clock millisecond of the last issued id, if any.
    pub fn last_timestamp(&self) -> Result<Option<Timestamp>> {
        let state = self.state.lock().map_err(|_| Error::StatePoisoned)?;
        state.last_timestamp.map(to_timestamp).transpose()
    }

    /// Generates the next unique id.
    ///
    /// - same millisecond: bump the sequence; when it wraps, spin until the
    ///   next millisecond
    /// - new millisecond: reset the sequence
    /// - clock moved backward by at most `max_backward_drift`: wait until it
    ///   catches up; anything larger is rejected with
    ///   [`Error::ClockRegression`]
    pub fn next_id(&self) -> Result<FlakeId> {
        let mut state = self.state.lock().map_err(|_| Error::StatePoisoned)?;

        let mut now = self.clock.now().as_millisecond();
        let mut sequence = 0;

        if let Some(last) = state.last_timestamp {
            if now < last {
                now = self.wait_out_drift(last, now)?;
            }

            if now == last {
                sequence = (state.sequence + 1) & MAX_SEQUENCE;
                if sequence == 0 {
                    // Sequence exhausted for this millisecond. Busy-wait
                    // rather than sleep so we land right on the boundary.
                    let next = to_timestamp(last + 1)?;
                    now = self
                        .clock
                        .spin_until(next, &self.shutdown, self.settings.spin_budget)?
                        .as_millisecond();
                }
            }
        }

        let elapsed = now - self.settings.start_epoch.as_millisecond();
        if elapsed < 0 || elapsed as u64 > MAX_TIMESTAMP {
            return Err(Error::OverTimeLimit);
        }

        let id = FlakeId::compose(elapsed as u64, self.settings.identity, sequence)?;

        state.last_timestamp = Some(now);
        state.sequence = sequence;

        Ok(id)
    }

    /// Handles `now < last`. Returns a reading no earlier than `last`, or
    /// fails without touching generator state.
    fn wait_out_drift(&self, last: i64, mut now: i64) -> Result<i64> {
        let drift_ms = last - now;
        let max_drift_ms = self.settings.max_backward_drift.as_millis() as i64;

        if drift_ms > max_drift_ms {
            warn!(drift_ms, max_drift_ms, "clock moved backwards beyond tolerance");
            return Err(self.regression(last, now));
        }

        warn!(drift_ms, "clock moved backwards, waiting for it to catch up");
        let target = to_timestamp(last + 1)?;
        for attempt in 1..=self.settings.drift_recheck_limit {
            if self.shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.clock.wait_until(target);
            now = self.clock.now().as_millisecond();
            if now >= last {
                debug!(attempt, "clock recovered from regression");
                return Ok(now);
            }
        }

        warn!(
            drift_ms = last - now,
            attempts = self.settings.drift_recheck_limit,
            "clock did not recover from regression"
        );
        Err(self.regression(last, now))
    }

    fn regression(&self, last: i64, now: i64) -> Error {
        match (to_timestamp(last), to_timestamp(now)) {
            (Ok(last_ts), Ok(now_ts)) => Error::ClockRegression {
                last: last_ts,
                now: now_ts,
                drift_ms: last - now,
            },
            (Err(e), _) | (_, Err(e)) => e,
        }
    }
}

fn to_timestamp(millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|_| Error::TimestampOutOfRange { millis })
}
