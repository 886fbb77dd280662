//! Provider trait and structured error types.
//!
//! The Provider trait abstracts over bar sources (Finam, Quotemedia, test
//! stubs) so the download orchestrator never depends on a concrete source.

use super::fetch::FetchError;
use super::range::{RangeBound, RangeError, TimeRange};
use crate::domain::{Bar, Operations, Period, Ticker};
use chrono::{Local, NaiveDateTime};
use thiserror::Error;

/// Errors raised by providers while resolving instruments or streaming bars.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unable to obtain data: {0}")]
    Obtain(String),

    #[error("invalid sample format: {0}")]
    InvalidSampleFormat(String),

    #[error("unsupported period: {0}")]
    UnsupportedPeriod(Period),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error(transparent)]
    Range(#[from] RangeError),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<FetchError> for ProviderError {
    fn from(e: FetchError) -> Self {
        Self::Obtain(e.to_string())
    }
}

/// Lazy, single-pass stream of bars in ascending timestamp order.
pub type BarStream<'a> = Box<dyn Iterator<Item = Result<Bar, ProviderError>> + 'a>;

/// Trait for bar sources.
///
/// Implementations provide `name`, `find` and `bars`; the remaining methods
/// are derived from those.
pub trait Provider {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Resolve a query to tickers (case-insensitive).
    ///
    /// Never returns an empty vector: no match is `ProviderError::NotFound`.
    fn find(&self, query: &str) -> Result<Vec<Ticker>, ProviderError>;

    /// Stream bars for `ticker` with `start <= timestamp < end`.
    ///
    /// Transport or decoding failures fail the call with `Obtain`. A row that
    /// cannot be parsed is yielded as `InvalidSampleFormat` and ends the
    /// stream.
    fn bars(
        &self,
        ticker: &Ticker,
        start: NaiveDateTime,
        end: NaiveDateTime,
        period: Period,
    ) -> Result<BarStream<'_>, ProviderError>;

    /// Forwarded helper operations copied into every ticker.
    fn operations(&self) -> Operations {
        Operations::default()
    }

    /// The most recent match for `query`.
    fn lookup(&self, query: &str) -> Result<Ticker, ProviderError> {
        self.find(query)?
            .pop()
            .ok_or_else(|| ProviderError::NotFound(query.to_string()))
    }

    /// Whether `query` resolves to a ticker with exactly that symbol.
    fn contains(&self, query: &str) -> bool {
        self.find(query)
            .map(|found| found.iter().any(|t| t.symbol.eq_ignore_ascii_case(query)))
            .unwrap_or(false)
    }

    /// Stream bars for loosely specified bounds, normalized against now.
    fn bars_between(
        &self,
        ticker: &Ticker,
        period: Period,
        start: RangeBound,
        end: RangeBound,
    ) -> Result<BarStream<'_>, ProviderError> {
        let range = TimeRange::normalize(start, end, period, Local::now().naive_local())?;
        self.bars(ticker, range.start, range.end, period)
    }
}

/// Restricts a parsed row stream to `[start, end)`.
///
/// Rows before `start` are skipped, the first row at or after `end` ends the
/// stream, and so does the first error (after it is yielded).
pub struct WindowedBars<I> {
    rows: I,
    start: NaiveDateTime,
    end: NaiveDateTime,
    done: bool,
}

impl<I> WindowedBars<I>
where
    I: Iterator<Item = Result<Bar, ProviderError>>,
{
    pub fn new(rows: I, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            rows,
            start,
            end,
            done: false,
        }
    }
}

impl<I> Iterator for WindowedBars<I>
where
    I: Iterator<Item = Result<Bar, ProviderError>>,
{
    type Item = Result<Bar, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.rows.next()? {
                Ok(bar) if bar.timestamp < self.start => continue,
                Ok(bar) if bar.timestamp >= self.end => self.done = true,
                Ok(bar) => return Some(Ok(bar)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
