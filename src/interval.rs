//! Report windows and exact interval-overlap arithmetic.
//!
//! Every statistic in this crate reduces to one primitive: how much of a
//! segment `[s, e)` falls inside a window `[ws, we)`. That overlap is
//! computed in integer nanoseconds with no rounding, so totals stay exact
//! across thousands of segments and the conservation property (splitting
//! a range into a tiling never drops or double-counts time) holds by
//! construction.

use crate::errors::MetricsError;
use crate::trace::TraceBounds;

pub const NS_PER_SEC: i64 = 1_000_000_000;

/// A `[start, end)` time range over which one output row's aggregates are
/// computed: either one bucket of the per-second tiling or a single
/// caller-supplied interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: i64,
    pub end: i64,
}

impl ReportWindow {
    pub fn dur(&self) -> i64 {
        self.end - self.start
    }

    /// Overlap duration between this window and `[start, end)`, in ns.
    /// Zero or negative means no overlap; callers discard those.
    pub fn overlap(&self, start: i64, end: i64) -> i64 {
        end.min(self.end) - start.max(self.start)
    }
}

/// Start of the absolute one-second bucket containing `ts`.
pub fn second_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(NS_PER_SEC)
}

/// Split `[start, end)` across the absolute one-second tiling, yielding
/// `(bucket_ts, overlap_ns)` for every second bucket it touches.
pub fn split_into_seconds(start: i64, end: i64) -> SecondSplit {
    SecondSplit {
        cursor: start,
        end,
    }
}

/// Iterator over the per-second pieces of one time range.
pub struct SecondSplit {
    cursor: i64,
    end: i64,
}

impl Iterator for SecondSplit {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<(i64, i64)> {
        if self.cursor >= self.end {
            return None;
        }
        let bucket = second_bucket(self.cursor);
        let piece_end = (bucket + NS_PER_SEC).min(self.end);
        let piece = (bucket, piece_end - self.cursor);
        self.cursor = piece_end;
        Some(piece)
    }
}

/// Validate a caller-supplied `(start, dur)` interval against the trace
/// bounds and turn it into a [`ReportWindow`].
///
/// Rejected up front, before any aggregation work: non-positive durations
/// and intervals reaching outside the trace. Nothing is silently clamped.
pub fn validate_interval(
    bounds: &TraceBounds,
    start: i64,
    dur: i64,
) -> Result<ReportWindow, MetricsError> {
    if dur <= 0 {
        return Err(MetricsError::InvalidInterval {
            start,
            dur,
            reason: "duration must be positive".into(),
        });
    }
    if start < bounds.start || start.saturating_add(dur) > bounds.end {
        return Err(MetricsError::InvalidInterval {
            start,
            dur,
            reason: format!(
                "interval outside trace bounds [{}, {})",
                bounds.start, bounds.end
            ),
        });
    }
    Ok(ReportWindow {
        start,
        end: start + dur,
    })
}
