//! Timeline building: raw state-change events to piecewise-constant segments.
//!
//! Each entity (one CPU's frequency track, one CPU's idle track) reports
//! its state as discrete edge events. This module turns one such ordered
//! stream into contiguous, non-overlapping [`Segment`]s: every event
//! closes the previous segment at its timestamp and opens a new one, and
//! the final segment runs open-ended to the trace end.
//!
//! Nothing is known about the value in effect before the first event, so
//! the segment list starts at the first event's timestamp, never at the
//! trace start. Callers that find no segment covering a window of
//! interest treat the entity as absent from that window, not as zero.

use crate::errors::MetricsError;

/// A maximal time range `[start, end)` over which an entity's monitored
/// value is constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: i64,
    pub end: i64,
    pub value: i64,
}

impl Segment {
    pub fn dur(&self) -> i64 {
        self.end - self.start
    }
}

/// Build the segment timeline for one entity from its `(ts, value)` event
/// stream.
///
/// `trace_end` closes the trailing segment. Events with equal timestamps
/// are allowed (the earlier one yields a zero-length segment, which every
/// downstream consumer discards); a timestamp going backwards rejects the
/// whole stream with [`MetricsError::MalformedStream`]. Events at or past
/// `trace_end` are dropped, and segments never extend past it.
pub fn build_segments(
    events: impl IntoIterator<Item = (i64, i64)>,
    trace_end: i64,
    entity: &str,
) -> Result<Vec<Segment>, MetricsError> {
    let mut segments = Vec::new();
    let mut open: Option<(i64, i64)> = None;

    for (ts, value) in events {
        if let Some((prev_ts, prev_value)) = open {
            if ts < prev_ts {
                return Err(MetricsError::malformed(format!(
                    "{entity}: timestamp {ts} precedes prior event at {prev_ts}"
                )));
            }
            if ts >= trace_end {
                // Stream continues past the bounds we were given; the
                // open segment still closes at trace_end below.
                break;
            }
            segments.push(Segment {
                start: prev_ts,
                end: ts,
                value: prev_value,
            });
        }
        open = Some((ts, value));
    }

    if let Some((ts, value)) = open {
        if ts < trace_end {
            segments.push(Segment {
                start: ts,
                end: trace_end,
                value,
            });
        }
    }

    Ok(segments)
}

/// Find the index of the first segment whose `end` is after `ts`.
///
/// Segment lists are sorted and non-overlapping, so this is the entry
/// point for a merge walk starting at `ts`.
pub fn first_overlapping(segments: &[Segment], ts: i64) -> usize {
    segments.partition_point(|seg| seg.end <= ts)
}
