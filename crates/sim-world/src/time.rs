//! World Time
//!
//! Minute-resolution simulation clock with a human-readable string form.
//!
//! # Example
//!
//! ```
//! use sim_world::WorldTime;
//!
//! let t = WorldTime::from_parts(3, 8, 30);
//! assert_eq!(t.to_string(), "day_3.08:30");
//! assert_eq!(t.hours_of_day(), 8.5);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of simulated minutes in a day.
pub const MINUTES_PER_DAY: u64 = 24 * 60;

/// Number of days in a week.
pub const DAYS_PER_WEEK: u64 = 7;

/// A point in simulation time, counted in minutes since day 0 at midnight.
///
/// Serializes to strings like "day_12.08:30".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WorldTime {
    minutes: u64,
}

impl WorldTime {
    /// Creates a time from a raw minute count.
    pub fn from_minutes(minutes: u64) -> Self {
        Self { minutes }
    }

    /// Creates a time from a day index plus hour and minute of that day.
    pub fn from_parts(day: u64, hour: u8, minute: u8) -> Self {
        Self {
            minutes: day * MINUTES_PER_DAY + u64::from(hour) * 60 + u64::from(minute),
        }
    }

    /// Total minutes since the start of the simulation.
    pub fn total_minutes(&self) -> u64 {
        self.minutes
    }

    /// Zero-based day index.
    pub fn day(&self) -> u64 {
        self.minutes / MINUTES_PER_DAY
    }

    /// Day of week in `0..=6`, day 0 being the first day of the week.
    pub fn day_of_week(&self) -> u64 {
        self.day() % DAYS_PER_WEEK
    }

    /// Minutes elapsed since midnight.
    pub fn minute_of_day(&self) -> u64 {
        self.minutes % MINUTES_PER_DAY
    }

    /// Fractional hour of the day, e.g. `8.5` for 08:30.
    pub fn hours_of_day(&self) -> f64 {
        self.minute_of_day() as f64 / 60.0
    }

    /// Returns a time advanced by the given number of minutes.
    pub fn plus_minutes(self, minutes: u64) -> Self {
        Self {
            minutes: self.minutes + minutes,
        }
    }
}

impl fmt::Display for WorldTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minute_of_day = self.minute_of_day();
        write!(
            f,
            "day_{}.{:02}:{:02}",
            self.day(),
            minute_of_day / 60,
            minute_of_day % 60
        )
    }
}

/// Error type for parsing WorldTime from strings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseTimeError {
    #[error("invalid time format: '{0}', expected 'day_N.HH:MM'")]
    InvalidFormat(String),
    #[error("invalid day: '{0}'")]
    InvalidDay(String),
    #[error("invalid clock: '{0}'")]
    InvalidClock(String),
}

impl FromStr for WorldTime {
    type Err = ParseTimeError;

    /// Parses a WorldTime from a string like "day_3.08:30".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day_part, clock_part) = s
            .split_once('.')
            .ok_or_else(|| ParseTimeError::InvalidFormat(s.to_string()))?;

        let day = day_part
            .strip_prefix("day_")
            .ok_or_else(|| ParseTimeError::InvalidFormat(s.to_string()))?
            .parse::<u64>()
            .map_err(|_| ParseTimeError::InvalidDay(day_part.to_string()))?;

        let (hour, minute) = clock_part
            .split_once(':')
            .ok_or_else(|| ParseTimeError::InvalidClock(clock_part.to_string()))?;
        let hour = hour
            .parse::<u8>()
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| ParseTimeError::InvalidClock(clock_part.to_string()))?;
        let minute = minute
            .parse::<u8>()
            .ok()
            .filter(|m| *m < 60)
            .ok_or_else(|| ParseTimeError::InvalidClock(clock_part.to_string()))?;

        Ok(WorldTime::from_parts(day, hour, minute))
    }
}

// Serialized as a string so world fixtures stay readable
impl Serialize for WorldTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WorldTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
