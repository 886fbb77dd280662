//! Chunk planning: split a range into bounded, contiguous fetch windows.

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk span must be positive, got {0}")]
    NonPositiveSpan(Duration),

    #[error("chunk span of {0} days is out of range")]
    TooLarge(i64),
}

/// A positive window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan(Duration);

impl ChunkSpan {
    pub fn new(span: Duration) -> Result<Self, ChunkError> {
        if span <= Duration::zero() {
            return Err(ChunkError::NonPositiveSpan(span));
        }
        Ok(Self(span))
    }

    pub fn days(days: i64) -> Result<Self, ChunkError> {
        Duration::try_days(days)
            .ok_or(ChunkError::TooLarge(days))
            .and_then(Self::new)
    }

    pub fn duration(self) -> Duration {
        self.0
    }
}

/// Half-open fetch window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lazy sequence of windows covering `[start, min(end, now))`.
///
/// Windows are contiguous and non-empty; all but the last are exactly one
/// span long. A clone continues from the same position, so clone before
/// iterating to replay the plan.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: NaiveDateTime,
    limit: NaiveDateTime,
    span: Duration,
}

impl ChunkPlan {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, span: ChunkSpan, now: NaiveDateTime) -> Self {
        Self {
            next: start,
            limit: end.min(now),
            span: span.duration(),
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next >= self.limit {
            return None;
        }
        let start = self.next;
        let end = start
            .checked_add_signed(self.span)
            .map_or(self.limit, |e| e.min(self.limit));
        self.next = end;
        Some(Window { start, end })
    }
}
