//! Time and duration value types
//!
//! Audio positions are absolute offsets from the start of an audio object
//! ([`Time`]); lengths are non-negative durations ([`TimeDelta`]). Both are
//! stored as whole nanoseconds so that byte/time conversions stay exact for
//! every practical byte rate.

use std::fmt;
use std::ops::{Add, Sub};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Absolute offset from the start of an audio object.
///
/// Negative values are representable so that out-of-range arguments can be
/// reported instead of silently clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    nanos: i64,
}

impl Time {
    /// The start of the audio.
    pub const ZERO: Time = Time { nanos: 0 };

    pub const fn from_nanos(nanos: i64) -> Self {
        Time { nanos }
    }

    /// Create a time from (possibly fractional) milliseconds, rounded to
    /// the nearest nanosecond.
    pub fn from_millis(millis: f64) -> Self {
        Time {
            nanos: (millis * NANOS_PER_MILLI).round() as i64,
        }
    }

    pub const fn as_nanos(&self) -> i64 {
        self.nanos
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_MILLI
    }

    pub const fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// Duration from `self` to `later`, or `None` when `later` lies before `self`.
    pub fn delta_to(&self, later: Time) -> Option<TimeDelta> {
        if later.nanos < self.nanos {
            return None;
        }
        Some(TimeDelta::from_nanos((later.nanos - self.nanos) as u64))
    }
}

impl From<TimeDelta> for Time {
    fn from(delta: TimeDelta) -> Self {
        Time {
            nanos: i64::try_from(delta.nanos).unwrap_or(i64::MAX),
        }
    }
}

impl Add<TimeDelta> for Time {
    type Output = Time;

    fn add(self, rhs: TimeDelta) -> Time {
        let rhs = i64::try_from(rhs.nanos).unwrap_or(i64::MAX);
        Time {
            nanos: self.nanos.saturating_add(rhs),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}

/// Non-negative duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeDelta {
    nanos: u64,
}

impl TimeDelta {
    pub const ZERO: TimeDelta = TimeDelta { nanos: 0 };

    pub const fn from_nanos(nanos: u64) -> Self {
        TimeDelta { nanos }
    }

    /// Create a duration from milliseconds. Negative input saturates to zero.
    pub fn from_millis(millis: f64) -> Self {
        TimeDelta {
            nanos: (millis * NANOS_PER_MILLI).round().max(0.0) as u64,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self::from_millis(secs * 1000.0)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub fn as_millis_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_MILLI
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.as_millis_f64() / 1000.0
    }

    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

impl Add for TimeDelta {
    type Output = TimeDelta;

    fn add(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta {
            nanos: self.nanos.saturating_add(rhs.nanos),
        }
    }
}

impl Sub for TimeDelta {
    type Output = TimeDelta;

    fn sub(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta {
            nanos: self.nanos.saturating_sub(rhs.nanos),
        }
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}ms", self.as_millis_f64())
    }
}
