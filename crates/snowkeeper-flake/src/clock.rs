use crate::error::{Error, Result};
use jiff::Timestamp;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub trait Clock: Send + Sync {
    /// Returns the current time of the clock
    fn now(&self) -> Timestamp;

    /// Block and wait until the clock reaches the target time.
    fn wait_until(&self, target: Timestamp);

    /// Busy-wait until the clock reaches the target time.
    ///
    /// Used for sequence rollover, where the wait is shorter than a
    /// millisecond and sleeping would overshoot. Gives up with
    /// [`Error::Cancelled`] once `shutdown` fires and with
    /// [`Error::ClockStalled`] after `budget` of real time.
    fn spin_until(
        &self,
        target: Timestamp,
        shutdown: &CancellationToken,
        budget: Duration,
    ) -> Result<Timestamp> {
        let started = Instant::now();
        loop {
            if shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let now = self.now();
            if now >= target {
                return Ok(now);
            }
            if started.elapsed() > budget {
                return Err(Error::ClockStalled { target });
            }
            std::hint::spin_loop();
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn wait_until(&self, target: Timestamp) {
        // Poll in a loop to handle spurious wakeups. The loop condition is
        // re-evaluated after each sleep so we don't over-sleep past the target.
        loop {
            let now = Timestamp::now();
            if now >= target {
                return;
            }
            let remaining_ms = (target.as_millisecond() - now.as_millisecond()).max(1) as u64;
            std::thread::sleep(Duration::from_millis(remaining_ms));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use crate::clock::Clock;
    use crate::error::{Error, Result};
    use jiff::{SignedDuration, Timestamp};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// A manually driven clock.
    ///
    /// Waiting jumps straight to the target instead of blocking, unless the
    /// clock is frozen, in which case waits return without moving time.
    #[derive(Clone)]
    pub(crate) struct TestClock {
        inner: Arc<Mutex<TestClockState>>,
    }

    struct TestClockState {
        now: Timestamp,
        frozen: bool,
    }

    impl TestClock {
        pub(crate) fn new(now: Timestamp) -> Self {
            Self {
                inner: Arc::new(Mutex::new(TestClockState { now, frozen: false })),
            }
        }

        pub(crate) fn from_millis(millis: i64) -> Self {
            Self::new(Timestamp::from_millisecond(millis).unwrap())
        }

        pub(crate) fn set_millis(&self, millis: i64) {
            self.lock().now = Timestamp::from_millisecond(millis).unwrap();
        }

        pub(crate) fn advance_millis(&self, millis: i64) {
            let mut state = self.lock();
            state.now = state.now + SignedDuration::from_millis(millis);
        }

        pub(crate) fn freeze(&self) {
            self.lock().frozen = true;
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, TestClockState> {
            self.inner
                .lock()
                .expect("test clock lock should not be poisoned")
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Timestamp {
            self.lock().now
        }

        fn wait_until(&self, target: Timestamp) {
            let mut state = self.lock();
            // just advance the clock to the target time;
            // we don't need to actually block since this is only used in tests
            if !state.frozen && target > state.now {
                state.now = target;
            }
        }

        fn spin_until(
            &self,
            target: Timestamp,
            shutdown: &CancellationToken,
            _budget: Duration,
        ) -> Result<Timestamp> {
            if shutdown.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut state = self.lock();
            if state.frozen && state.now < target {
                return Err(Error::ClockStalled { target });
            }
            if target > state.now {
                state.now = target;
            }
            Ok(state.now)
        }
    }

    #[test]
    fn test_clock_works() {
        // test that the clock starts at the given time
        let base = Timestamp::from_second(0).unwrap();
        let clock = TestClock::new(base);
        assert_eq!(clock.now(), base);

        // the clock should advance to the target time after wait_until
        let target = Timestamp::from_second(1000).unwrap();
        clock.wait_until(target);
        assert_eq!(clock.now(), target);

        clock.advance_millis(-5);
        assert_eq!(clock.now().as_millisecond(), 999_995);
    }

    #[test]
    fn frozen_clock_does_not_move() {
        let clock = TestClock::from_millis(100);
        clock.freeze();
        clock.wait_until(Timestamp::from_millisecond(200).unwrap());
        assert_eq!(clock.now().as_millisecond(), 100);
    }
}
