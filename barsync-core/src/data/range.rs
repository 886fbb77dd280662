//! Time range normalization.
//!
//! Turns a loosely specified `(start, end)` pair into a canonical, minute
//! aligned window. Every pass normalizes once against a single "now".

use crate::domain::Period;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("start {start} is after end {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("unrecognized time bound: {0}")]
    InvalidArgumentType(String),
}

/// One side of a requested range, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeBound {
    #[default]
    Absent,
    /// Number of periods back from the end (start side only).
    Lookback(u32),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

const MAX_LOOKBACK_DIGITS: usize = 6;

impl RangeBound {
    /// Parse a textual bound.
    ///
    /// Accepts an empty string, `YYYYMMDDHHMM`, `YYYY-MM-DD HH:MM[:SS]` (or
    /// with `T`), `YYYY-MM-DD`, `YYYYMMDD`, `HH:MM[:SS]`, or a lookback count
    /// of at most six digits.
    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let s = text.trim();
        if s.is_empty() {
            return Ok(Self::Absent);
        }

        let invalid = || RangeError::InvalidArgumentType(text.to_string());

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return match s.len() {
                12 => NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M")
                    .map(Self::DateTime)
                    .map_err(|_| invalid()),
                8 => NaiveDate::parse_from_str(s, "%Y%m%d")
                    .map(Self::Date)
                    .map_err(|_| invalid()),
                n if n <= MAX_LOOKBACK_DIGITS => {
                    s.parse().map(Self::Lookback).map_err(|_| invalid())
                }
                _ => Err(invalid()),
            };
        }

        if let Some(dt) = DATETIME_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        {
            return Ok(Self::DateTime(dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Date(d));
        }
        if let Some(t) = TIME_FORMATS
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
        {
            return Ok(Self::Time(t));
        }

        Err(invalid())
    }

    /// Interpret a bare integer (e.g. from a config file) as a lookback count.
    pub fn from_count(count: i64) -> Result<Self, RangeError> {
        u32::try_from(count)
            .map(Self::Lookback)
            .map_err(|_| RangeError::InvalidArgumentType(count.to_string()))
    }

    fn resolve(self, today: NaiveDate) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Self::Time(t) => Some(today.and_time(t)),
            Self::DateTime(dt) => Some(dt),
            Self::Absent | Self::Lookback(_) => None,
        }
    }
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("-"),
            Self::Lookback(n) => write!(f, "{n} periods back"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
        }
    }
}

/// Canonical `[start, end]` window; `start <= end`, both minute aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub period: Period,
}

impl TimeRange {
    /// Normalize loose bounds against `now`.
    ///
    /// The end defaults to `now` and is floored to the minute. The start
    /// defaults to midnight today; a lookback of `n` means `end - n * period`.
    /// A start that carries seconds is pushed forward one period and then
    /// floored, so it never precedes the requested instant.
    pub fn normalize(
        start: RangeBound,
        end: RangeBound,
        period: Period,
        now: NaiveDateTime,
    ) -> Result<Self, RangeError> {
        let today = now.date();

        let end = match end {
            RangeBound::Absent => now,
            RangeBound::Lookback(n) => {
                return Err(RangeError::InvalidArgumentType(format!(
                    "lookback count {n} is not a valid end"
                )))
            }
            bound => bound.resolve(today).unwrap_or(now),
        };
        let end = floor_minute(end);

        let start = match start {
            RangeBound::Absent => today.and_time(NaiveTime::MIN),
            RangeBound::Lookback(n) => period
                .total_minutes()
                .checked_mul(i64::from(n))
                .and_then(Duration::try_minutes)
                .and_then(|back| end.checked_sub_signed(back))
                .ok_or_else(|| RangeError::InvalidArgumentType(format!("lookback count {n}")))?,
            bound => bound.resolve(today).unwrap_or(end),
        };
        let start = if has_seconds(start) {
            let advanced = start.checked_add_signed(period.duration()).ok_or_else(|| {
                RangeError::InvalidArgumentType(format!("start {start} plus one {period} period"))
            })?;
            floor_minute(advanced)
        } else {
            start
        };

        if start > end {
            return Err(RangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end, period })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {} ({})", self.start, self.end, self.period)
    }
}

fn has_seconds(t: NaiveDateTime) -> bool {
    t.second() != 0 || t.nanosecond() != 0
}

fn floor_minute(t: NaiveDateTime) -> NaiveDateTime {
    t - Duration::seconds(i64::from(t.second())) - Duration::nanoseconds(i64::from(t.nanosecond()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn m15() -> Period {
        Period::minutes(15).unwrap()
    }

    // ── Parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_every_textual_shape() {
        assert_eq!(RangeBound::parse("").unwrap(), RangeBound::Absent);
        assert_eq!(
            RangeBound::parse("201611010930").unwrap(),
            RangeBound::DateTime(dt(2016, 11, 1, 9, 30, 0))
        );
        assert_eq!(
            RangeBound::parse("2016-11-01 09:30:15").unwrap(),
            RangeBound::DateTime(dt(2016, 11, 1, 9, 30, 15))
        );
        assert_eq!(
            RangeBound::parse("2016-11-01T09:30").unwrap(),
            RangeBound::DateTime(dt(2016, 11, 1, 9, 30, 0))
        );
        assert_eq!(
            RangeBound::parse("2016-11-01").unwrap(),
            RangeBound::Date(NaiveDate::from_ymd_opt(2016, 11, 1).unwrap())
        );
        assert_eq!(
            RangeBound::parse("20161101").unwrap(),
            RangeBound::Date(NaiveDate::from_ymd_opt(2016, 11, 1).unwrap())
        );
        assert_eq!(
            RangeBound::parse("10:15").unwrap(),
            RangeBound::Time(NaiveTime::from_hms_opt(10, 15, 0).unwrap())
        );
        assert_eq!(RangeBound::parse("20").unwrap(), RangeBound::Lookback(20));
    }

    #[test]
    fn rejects_unrecognized_text() {
        for bad in ["yesterday", "2016-13-01", "1234567", "2016/11/01"] {
            assert!(
                matches!(RangeBound::parse(bad), Err(RangeError::InvalidArgumentType(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn negative_count_is_rejected() {
        assert!(RangeBound::from_count(-1).is_err());
        assert_eq!(RangeBound::from_count(5).unwrap(), RangeBound::Lookback(5));
    }

    // ── Normalization ────────────────────────────────────────────────

    #[test]
    fn absent_bounds_cover_today_until_now() {
        let now = dt(2021, 3, 5, 14, 7, 42);
        let r = TimeRange::normalize(RangeBound::Absent, RangeBound::Absent, m15(), now).unwrap();
        assert_eq!(r.start, dt(2021, 3, 5, 0, 0, 0));
        assert_eq!(r.end, dt(2021, 3, 5, 14, 7, 0));
    }

    #[test]
    fn lookback_counts_periods_from_end() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let r = TimeRange::normalize(
            RangeBound::Lookback(20),
            RangeBound::Absent,
            Period::day(),
            now,
        )
        .unwrap();
        assert_eq!(r.start, dt(2021, 2, 13, 14, 0, 0));
        assert_eq!(r.end, now);
    }

    #[test]
    fn start_with_seconds_is_advanced_one_period() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let r = TimeRange::normalize(
            RangeBound::DateTime(dt(2021, 3, 5, 10, 0, 30)),
            RangeBound::Absent,
            m15(),
            now,
        )
        .unwrap();
        assert_eq!(r.start, dt(2021, 3, 5, 10, 15, 0));
    }

    #[test]
    fn date_and_time_bounds_resolve_against_today() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let r = TimeRange::normalize(
            RangeBound::Date(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()),
            RangeBound::Time(NaiveTime::from_hms_opt(12, 30, 59).unwrap()),
            m15(),
            now,
        )
        .unwrap();
        assert_eq!(r.start, dt(2021, 3, 1, 0, 0, 0));
        assert_eq!(r.end, dt(2021, 3, 5, 12, 30, 0));
    }

    #[test]
    fn start_after_end_is_invalid() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let err = TimeRange::normalize(
            RangeBound::Date(NaiveDate::from_ymd_opt(2021, 2, 1).unwrap()),
            RangeBound::Date(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()),
            Period::day(),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::InvalidRange { .. }));
    }

    #[test]
    fn oversized_period_is_an_error_not_a_panic() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let huge = Period::minutes(100_000_000_000_000).unwrap();
        let err = TimeRange::normalize(
            RangeBound::DateTime(dt(2016, 11, 1, 10, 0, 30)),
            RangeBound::Absent,
            huge,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, RangeError::InvalidArgumentType(_)));

        let err = TimeRange::normalize(RangeBound::Lookback(999_999), RangeBound::Absent, huge, now)
            .unwrap_err();
        assert!(matches!(err, RangeError::InvalidArgumentType(_)));
    }

    #[test]
    fn lookback_as_end_is_rejected() {
        let now = dt(2021, 3, 5, 14, 0, 0);
        let err =
            TimeRange::normalize(RangeBound::Absent, RangeBound::Lookback(3), m15(), now)
                .unwrap_err();
        assert!(matches!(err, RangeError::InvalidArgumentType(_)));
    }
}
