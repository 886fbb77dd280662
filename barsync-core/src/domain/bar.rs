//! Bar: the fundamental market data unit and its record-line format.

use super::period::Period;
use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

/// Timestamp layout used in record lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Field separator used in record lines.
pub const FIELD_SEPARATOR: char = ';';

const FIELD_COUNT: usize = 9;

/// Errors from parsing a record line back into a bar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarParseError {
    #[error("expected 9 fields, got {found} in '{line}'")]
    FieldCount { found: usize, line: String },

    #[error("invalid {field} '{value}'")]
    Field { field: &'static str, value: String },
}

/// OHLCV bar for a single symbol over one period.
///
/// Equality is field-wise: two bars with `volume: None` compare equal, but a
/// bar with `volume: Some(0)` does not equal one with `volume: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub period: Period,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
    pub interest: Option<u64>,
}

impl Bar {
    pub fn period_code(&self) -> String {
        self.period.code()
    }

    /// Serialize into one record line (without the trailing newline).
    ///
    /// Fields: `symbol;timestamp;period;open;high;low;close;volume;interest`.
    /// Absent volume or interest is written as an empty field.
    pub fn to_line(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{}",
            self.symbol,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.period.code(),
            format_price(self.open),
            format_price(self.high),
            format_price(self.low),
            format_price(self.close),
            format_optional(self.volume),
            format_optional(self.interest),
        )
    }

    /// Parse a record line produced by [`Bar::to_line`].
    ///
    /// Empty and `None` optional fields both read back as absent.
    pub fn from_line(line: &str) -> Result<Self, BarParseError> {
        let fields: Vec<&str> = line.trim_end().split(FIELD_SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(BarParseError::FieldCount {
                found: fields.len(),
                line: line.to_string(),
            });
        }

        Ok(Self {
            symbol: fields[0].to_string(),
            timestamp: parse_timestamp(fields[1])?,
            period: fields[2].parse().map_err(|_| BarParseError::Field {
                field: "period",
                value: fields[2].to_string(),
            })?,
            open: parse_price("open", fields[3])?,
            high: parse_price("high", fields[4])?,
            low: parse_price("low", fields[5])?,
            close: parse_price("close", fields[6])?,
            volume: parse_optional("volume", fields[7])?,
            interest: parse_optional("interest", fields[8])?,
        })
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Parse the timestamp field of a record line.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, BarParseError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        BarParseError::Field {
            field: "timestamp",
            value: value.to_string(),
        }
    })
}

// Whole prices keep one fractional digit so the column type stays obvious.
fn format_price(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn format_optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_price(field: &'static str, value: &str) -> Result<f64, BarParseError> {
    value.trim().parse().map_err(|_| BarParseError::Field {
        field,
        value: value.to_string(),
    })
}

fn parse_optional(field: &'static str, value: &str) -> Result<Option<u64>, BarParseError> {
    match value.trim() {
        "" | "None" => Ok(None),
        v => v.parse().map(Some).map_err(|_| BarParseError::Field {
            field,
            value: value.to_string(),
        }),
    }
}
