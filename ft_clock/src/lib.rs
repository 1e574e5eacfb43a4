#[cfg(test)]
#[macro_use]
extern crate approx;
use bincode::{Decode, Encode};
use core::ops::{Add, Sub};
pub use quanta::Instant;
use quanta::{Clock as QuantaClock, Mock};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Div;
use std::sync::Arc;
use std::time::Duration;

/// A span of time in nanoseconds.
/// It is always positive to simplify the reasoning on the user side.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Encode, Decode,
)]
#[serde(transparent)]
pub struct FtDuration(pub u64);

impl FtDuration {
    pub const ZERO: FtDuration = FtDuration(0);

    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        FtDuration(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        FtDuration(micros * 1_000)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        FtDuration(millis * 1_000_000)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        FtDuration(secs * 1_000_000_000)
    }

    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }
}

/// bridge the API with standard Durations.
impl From<Duration> for FtDuration {
    fn from(duration: Duration) -> Self {
        FtDuration(duration.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl From<FtDuration> for Duration {
    fn from(duration: FtDuration) -> Self {
        Duration::from_nanos(duration.0)
    }
}

impl From<u64> for FtDuration {
    fn from(duration: u64) -> Self {
        FtDuration(duration)
    }
}

impl From<FtDuration> for u64 {
    fn from(duration: FtDuration) -> Self {
        duration.0
    }
}

impl Sub for FtDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        FtDuration(self.0.saturating_sub(rhs.0))
    }
}

impl Add for FtDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        FtDuration(self.0.saturating_add(rhs.0))
    }
}

// a way to divide a duration by a scalar.
// useful to compute averages for example.
impl<T> Div<T> for FtDuration
where
    T: Into<u64>,
{
    type Output = Self;
    fn div(self, rhs: T) -> Self {
        FtDuration(self.0 / rhs.into())
    }
}

impl Display for FtDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let nanos = self.0;
        if nanos >= 86_400_000_000_000 {
            write!(f, "{:.3} d", nanos as f64 / 86_400_000_000_000.0)
        } else if nanos >= 3_600_000_000_000 {
            write!(f, "{:.3} h", nanos as f64 / 3_600_000_000_000.0)
        } else if nanos >= 60_000_000_000 {
            write!(f, "{:.3} m", nanos as f64 / 60_000_000_000.0)
        } else if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1_000_000_000.0)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1_000_000.0)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1_000.0)
        } else {
            write!(f, "{} ns", nanos)
        }
    }
}

/// A point in time, in nanoseconds from an arbitrary origin shared by every
/// publisher of the tree (usually the epoch or the robot start time).
/// It is signed so that producers stamping against different origins can be
/// compared without wrapping.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default, Encode, Decode,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// Convenience for tests and configuration: fractional seconds to nanoseconds.
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs * 1_000_000_000.0).round() as i64)
    }

    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    /// Unsigned distance between two timestamps.
    #[inline]
    pub fn abs_diff(self, other: Timestamp) -> FtDuration {
        FtDuration(self.0.abs_diff(other.0))
    }

    #[inline]
    pub fn saturating_sub(self, duration: FtDuration) -> Timestamp {
        let d = duration.0.min(i64::MAX as u64) as i64;
        Timestamp(self.0.saturating_sub(d))
    }

    #[inline]
    pub fn saturating_add(self, duration: FtDuration) -> Timestamp {
        let d = duration.0.min(i64::MAX as u64) as i64;
        Timestamp(self.0.saturating_add(d))
    }
}

impl From<i64> for Timestamp {
    fn from(nanos: i64) -> Self {
        Timestamp(nanos)
    }
}

impl From<Timestamp> for i64 {
    fn from(t: Timestamp) -> Self {
        t.0
    }
}

impl Add<FtDuration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: FtDuration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<FtDuration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: FtDuration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

/// Signed difference in nanoseconds.
impl Sub for Timestamp {
    type Output = i64;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}", FtDuration(self.0.unsigned_abs()))
        } else {
            write!(f, "{}", FtDuration(self.0 as u64))
        }
    }
}

/// A running clock.
/// The clock is a monotonic clock that starts at an arbitrary reference time.
/// It is clone resilient, ie a clone will be the same clock, even when mocked.
#[derive(Clone, Debug)]
pub struct Clock {
    inner: QuantaClock, // This is a wrapper on quanta::Clock today.
    ref_time: Instant,  // The reference instant on which this clock is based.
    offset: i64,        // Added to every reading, see from_ref_time.
}

/// A mock clock that can be controlled by the user.
#[derive(Debug, Clone)]
pub struct ClockMock(Arc<Mock>); // wraps the Mock from quanta today.

impl ClockMock {
    pub fn increment(&self, amount: Duration) {
        self.0.increment(amount);
    }

    /// Decrements the time by the given amount.
    /// Be careful this breaks the monotonicity of the clock.
    pub fn decrement(&self, amount: Duration) {
        self.0.decrement(amount);
    }

    /// Gets the current value of time.
    pub fn value(&self) -> u64 {
        self.0.value()
    }

    /// Sets the absolute value of the time.
    pub fn set_value(&self, value: u64) {
        let v = self.0.value();
        // quanta only exposes relative moves.
        if v < value {
            self.increment(Duration::from_nanos(value - v));
        } else {
            self.decrement(Duration::from_nanos(v - value));
        }
    }
}

impl Clock {
    /// Creates a Clock using now as its reference time.
    /// It will start a 0ns incrementing monotonically.
    pub fn new() -> Self {
        let clock = QuantaClock::new();
        let ref_time = clock.now();
        Clock {
            inner: clock,
            ref_time,
            offset: 0,
        }
    }

    /// Builds a monotonic clock whose first reading is `ref_time_ns`.
    /// Useful to line the clock up with the origin publishers stamp against.
    pub fn from_ref_time(ref_time_ns: i64) -> Self {
        let clock = QuantaClock::new();
        let ref_time = clock.now();
        Clock {
            inner: clock,
            ref_time,
            offset: ref_time_ns,
        }
    }

    /// Build a fake clock with a reference time of 0.
    /// The ClockMock interface enables you to control all the clones of the clock given.
    pub fn mock() -> (Self, ClockMock) {
        let (clock, mock) = QuantaClock::mock();
        let ref_time = clock.now();
        (
            Clock {
                inner: clock,
                ref_time,
                offset: 0,
            },
            ClockMock(mock),
        )
    }

    /// Time elapsed since the reference time, shifted by the configured origin.
    /// It is a monotonically increasing value.
    #[inline]
    pub fn now(&self) -> Timestamp {
        let elapsed = (self.inner.now() - self.ref_time).as_nanos();
        Timestamp(self.offset.saturating_add(elapsed.min(i64::MAX as u128) as i64))
    }

    /// A less precise but quicker time
    #[inline]
    pub fn recent(&self) -> Timestamp {
        let elapsed = (self.inner.recent() - self.ref_time).as_nanos();
        Timestamp(self.offset.saturating_add(elapsed.min(i64::MAX as u128) as i64))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A trait to provide a clock to the frame tree.
pub trait ClockProvider {
    fn get_clock(&self) -> Clock;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock() {
        let (clock, mock) = Clock::mock();
        assert_eq!(clock.now(), Timestamp::ZERO);
        mock.increment(Duration::from_secs(1));
        assert_eq!(clock.now(), Timestamp::from_nanos(1_000_000_000));
    }

    #[test]
    fn test_mock_clone() {
        let (clock, mock) = Clock::mock();
        let clock_clone = clock.clone();
        mock.increment(Duration::from_secs(1));
        assert_eq!(clock_clone.now(), Timestamp::from_nanos(1_000_000_000));
    }

    #[test]
    fn test_mock_set_value() {
        let (clock, mock) = Clock::mock();
        mock.set_value(5_000);
        assert_eq!(clock.now().as_nanos(), 5_000);
        mock.set_value(2_000);
        assert_eq!(clock.now().as_nanos(), 2_000);
    }

    #[test]
    fn test_from_ref_time() {
        let tolerance_ms = 10;
        let clock = Clock::from_ref_time(1_000_000_000);
        assert_relative_eq!(
            clock.now().as_nanos() as f64 / 1_000_000.0,
            1_000.0,
            epsilon = tolerance_ms as f64
        );
    }

    #[test]
    fn test_some_time_arithmetics() {
        let a: FtDuration = 10.into();
        let b: FtDuration = 20.into();
        assert_eq!((a + b).0, 30);
        assert_eq!((b - a).0, 10);
        assert_eq!((a - b).0, 0);

        let t = Timestamp::from_nanos(100);
        assert_eq!(t + a, Timestamp::from_nanos(110));
        assert_eq!(t - b, Timestamp::from_nanos(80));
        assert_eq!(Timestamp::from_nanos(50) - t, -50);
        assert_eq!(Timestamp::from_nanos(50).abs_diff(t), FtDuration(50));
    }

    #[test]
    fn test_secs_conversion() {
        assert_eq!(Timestamp::from_secs_f64(0.5).as_nanos(), 500_000_000);
        assert_relative_eq!(Timestamp::from_nanos(1_500_000_000).as_secs_f64(), 1.5);
    }

    #[test]
    fn test_display() {
        assert_eq!(FtDuration(12).to_string(), "12 ns");
        assert_eq!(FtDuration::from_millis(1500).to_string(), "1.500 s");
        assert_eq!(Timestamp::from_nanos(-12).to_string(), "-12 ns");
    }
}
