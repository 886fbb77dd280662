//! Property tests for range and chunk invariants.
//!
//! Uses proptest to verify:
//! 1. Normalized ranges are minute aligned, ordered, and inside the request
//! 2. Inverted requests are rejected
//! 3. A lookback start lies exactly `n` periods before the end
//! 4. Chunk windows tile `[start, min(end, now))` with no gaps or overlaps
//! 5. Every window but the last is exactly one span long

use barsync_core::data::{ChunkPlan, ChunkSpan, RangeBound, RangeError, TimeRange, Window};
use barsync_core::domain::Period;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Instants within roughly two years of 2016-01-01, down to the second.
fn arb_instant() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..2 * 365 * 24 * 3600).prop_map(|s| epoch() + Duration::seconds(s))
}

fn arb_period() -> impl Strategy<Value = Period> {
    prop_oneof![
        Just(1i64),
        Just(5),
        Just(15),
        Just(60),
        Just(1440),
        Just(10080),
    ]
    .prop_map(|m| Period::minutes(m).unwrap())
}

fn arb_span() -> impl Strategy<Value = ChunkSpan> {
    (60i64..20_000).prop_map(|m| ChunkSpan::new(Duration::minutes(m)).unwrap())
}

fn now() -> NaiveDateTime {
    epoch() + Duration::days(3 * 365)
}

fn windows(start: NaiveDateTime, end: NaiveDateTime, span: ChunkSpan, now: NaiveDateTime) -> Vec<Window> {
    ChunkPlan::new(start, end, span, now).collect()
}

// ── 1. Normalized ranges ─────────────────────────────────────────────

proptest! {
    /// Output is minute aligned, ordered, and never widens the request.
    #[test]
    fn normalized_range_is_aligned_and_inside_request(
        a in arb_instant(),
        b in arb_instant(),
        period in arb_period(),
    ) {
        let (raw_start, raw_end) = if a <= b { (a, b) } else { (b, a) };
        let result = TimeRange::normalize(
            RangeBound::DateTime(raw_start),
            RangeBound::DateTime(raw_end),
            period,
            now(),
        );

        match result {
            Ok(range) => {
                prop_assert_eq!(range.start.second(), 0);
                prop_assert_eq!(range.end.second(), 0);
                prop_assert!(range.start <= range.end);
                prop_assert!(range.start >= raw_start);
                prop_assert!(range.start <= raw_start + period.duration());
                prop_assert!(range.end <= raw_end);
                prop_assert!(raw_end - range.end < Duration::minutes(1));
            }
            Err(RangeError::InvalidRange { .. }) => {
                // Only a start with seconds pushed past the end can fail.
                prop_assert!(raw_start.second() != 0);
                prop_assert!(raw_end - raw_start < period.duration() + Duration::minutes(1));
            }
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }
}

// ── 2. Inverted requests ─────────────────────────────────────────────

proptest! {
    #[test]
    fn inverted_dates_are_rejected(
        d in 0i64..700,
        gap in 1i64..300,
        period in arb_period(),
    ) {
        let end = (epoch() + Duration::days(d)).date();
        let start = end + Duration::days(gap);
        let result = TimeRange::normalize(
            RangeBound::Date(start),
            RangeBound::Date(end),
            period,
            now(),
        );
        let is_invalid = matches!(result, Err(RangeError::InvalidRange { .. }));
        prop_assert!(is_invalid);
    }
}

// ── 3. Lookback ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn lookback_counts_whole_periods(
        end in arb_instant(),
        n in 0u32..500,
        period in arb_period(),
    ) {
        let range = TimeRange::normalize(
            RangeBound::Lookback(n),
            RangeBound::DateTime(end),
            period,
            now(),
        ).unwrap();
        prop_assert_eq!(
            range.end - range.start,
            Duration::minutes(period.total_minutes() * i64::from(n))
        );
    }
}

// ── 4./5. Chunk coverage ─────────────────────────────────────────────

proptest! {
    /// Windows are contiguous, non-empty, and cover exactly the capped range.
    #[test]
    fn chunks_tile_the_capped_range(
        start in arb_instant(),
        end in arb_instant(),
        cap in arb_instant(),
        span in arb_span(),
    ) {
        let plan = windows(start, end, span, cap);
        let limit = end.min(cap);

        if start >= limit {
            prop_assert!(plan.is_empty());
        } else {
            prop_assert_eq!(plan[0].start, start);
            prop_assert_eq!(plan[plan.len() - 1].end, limit);
            for pair in plan.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for w in &plan {
                prop_assert!(w.start < w.end);
            }
        }
    }

    #[test]
    fn all_but_last_chunk_are_full(
        start in arb_instant(),
        end in arb_instant(),
        span in arb_span(),
    ) {
        let plan = windows(start, end, span, now());
        if let Some((last, full)) = plan.split_last() {
            for w in full {
                prop_assert_eq!(w.duration(), span.duration());
            }
            prop_assert!(last.duration() <= span.duration());
        }
    }
}
