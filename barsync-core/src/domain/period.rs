//! Period: the fixed duration a single bar aggregates.

use chrono::Duration;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a timeframe value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("timeframe can only be \"D\"/\"W\"/\"H\" or a positive number of minutes, got '{0}'")]
    Unrecognized(String),

    #[error("timeframe must be a positive number of minutes, got {0}")]
    NonPositive(i64),

    #[error("timeframe of {0} minutes is too large")]
    OutOfRange(i64),
}

/// A positive bar duration with whole-minute resolution.
///
/// The canonical short code is `D` for one day, `W` for one week, `H` for one
/// hour and the integer minute count for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    minutes: i64,
}

impl Period {
    const HOUR: i64 = 60;
    const DAY: i64 = 24 * 60;
    const WEEK: i64 = 7 * 24 * 60;

    pub fn minutes(minutes: i64) -> Result<Self, PeriodError> {
        if minutes <= 0 {
            return Err(PeriodError::NonPositive(minutes));
        }
        if Duration::try_minutes(minutes).is_none() {
            return Err(PeriodError::OutOfRange(minutes));
        }
        Ok(Self { minutes })
    }

    pub fn hour() -> Self {
        Self { minutes: Self::HOUR }
    }

    pub fn day() -> Self {
        Self { minutes: Self::DAY }
    }

    pub fn week() -> Self {
        Self { minutes: Self::WEEK }
    }

    /// Total length in minutes (used for record file names).
    pub fn total_minutes(self) -> i64 {
        self.minutes
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes)
    }

    /// Canonical short code written into every record line.
    pub fn code(self) -> String {
        match self.minutes {
            Self::DAY => "D".to_string(),
            Self::WEEK => "W".to_string(),
            Self::HOUR => "H".to_string(),
            m => m.to_string(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    /// Accepts `d`/`day`, `w`/`week`, `h`/`hour` (any case) or a minute count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "d" | "day" => Ok(Self::day()),
            "w" | "week" => Ok(Self::week()),
            "h" | "hour" => Ok(Self::hour()),
            other => {
                let minutes: i64 = other
                    .parse()
                    .map_err(|_| PeriodError::Unrecognized(trimmed.to_string()))?;
                Self::minutes(minutes)
            }
        }
    }
}
