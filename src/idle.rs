//! Idle residency statistics.
//!
//! Two independent calculators share the interval arithmetic:
//!
//! - Edge-based: walks the per-CPU idle segment timeline. Every closed
//!   segment with a real idle state is one idle episode; an episode still
//!   open at the end of the data is dropped rather than overcounted.
//! - Counter-based: differences consecutive cumulative residency counter
//!   samples per (cpu, state), and synthesizes a complementary "C0"
//!   active row per sample gap so percentages close to exactly 100.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::errors::MetricsError;
use crate::interval::ReportWindow;
use crate::timeline::Segment;
use crate::trace::{IdleResidencySampleRecord, IdleStatRow, IdleTimeInStateRow, IDLE_STATE_ACTIVE};

/// Nanoseconds per unit of the reported `time_slice` column (µs, the
/// same unit the cumulative residency counters use).
const NS_PER_TIME_SLICE: i64 = 1_000;

/// Edge-based idle statistics for one CPU, restricted to `window`.
///
/// `segments` is the CPU's idle timeline from the timeline builder. The
/// trailing segment was closed by the trace bound rather than by an
/// event, so if it is an idle state it is an incomplete episode and is
/// excluded. The percentage denominator is the CPU's observed data span
/// (first event to end of timeline) clipped to the window.
pub(crate) fn idle_stats_for_cpu(
    cpu: i32,
    segments: &[Segment],
    window: &ReportWindow,
) -> Vec<IdleStatRow> {
    let Some(last) = segments.last() else {
        return Vec::new();
    };
    let observed = window.overlap(segments[0].start, last.end);
    if observed <= 0 {
        return Vec::new();
    }

    // (count, dur) per raw idle state, closed episodes only.
    let mut per_state: BTreeMap<i64, (u64, i64)> = BTreeMap::new();
    for seg in &segments[..segments.len() - 1] {
        if seg.value == IDLE_STATE_ACTIVE {
            continue;
        }
        let overlap = window.overlap(seg.start, seg.end);
        if overlap <= 0 {
            continue;
        }
        let entry = per_state.entry(seg.value).or_default();
        entry.0 += 1;
        entry.1 += overlap;
    }

    per_state
        .into_iter()
        .map(|(state, (count, dur))| IdleStatRow {
            cpu,
            // Reported state numbering is raw index + 1.
            state: state + 1,
            count,
            dur,
            avg_dur: dur / count as i64,
            idle_percent: dur as f64 * 100.0 / observed as f64,
        })
        .collect()
}

/// Counter-based idle time-in-state rows from cumulative residency
/// samples.
///
/// Samples must be time-ordered per (cpu, state); a backwards timestamp
/// rejects the stream. The first sample of each (cpu, state) has no
/// baseline to difference against and produces no row. A decreasing
/// counter value (the counter is defined as monotonically non-decreasing)
/// is skipped with a warning rather than producing a negative residency.
pub(crate) fn idle_time_in_state_rows(
    samples: &[IdleResidencySampleRecord],
) -> Result<Vec<IdleTimeInStateRow>, MetricsError> {
    // Last-seen sample per (cpu, state).
    let mut baselines: BTreeMap<(i32, &str), (i64, i64)> = BTreeMap::new();
    // Per-state deltas keyed for deterministic output order.
    let mut state_rows: BTreeMap<(i32, String, i64), (f64, f64, i64)> = BTreeMap::new();
    // Aggregate per (cpu, ts) for the synthesized active state.
    let mut totals: BTreeMap<(i32, i64), (f64, i64, i64)> = BTreeMap::new();

    for sample in samples {
        let key = (sample.cpu, sample.state.as_str());
        let Some(&(prev_ts, prev_value)) = baselines.get(&key) else {
            debug!(
                cpu = sample.cpu,
                state = %sample.state,
                ts = sample.ts,
                "first residency sample, no baseline yet"
            );
            baselines.insert(key, (sample.ts, sample.duration_us));
            continue;
        };
        if sample.ts < prev_ts {
            return Err(MetricsError::malformed(format!(
                "cpu{} cpuidle.{}: residency sample at {} precedes prior sample at {}",
                sample.cpu, sample.state, sample.ts, prev_ts
            )));
        }
        baselines.insert(key, (sample.ts, sample.duration_us));

        let time_slice = (sample.ts - prev_ts) / NS_PER_TIME_SLICE;
        if time_slice <= 0 {
            continue;
        }
        let delta = sample.duration_us - prev_value;
        if delta < 0 {
            warn!(
                cpu = sample.cpu,
                state = %sample.state,
                ts = sample.ts,
                delta,
                "cumulative residency counter went backwards, skipping sample pair"
            );
            continue;
        }

        let percentage = delta as f64 / time_slice as f64 * 100.0;
        state_rows.insert(
            (sample.cpu, sample.state.clone(), sample.ts),
            (percentage, delta as f64, time_slice),
        );
        let total = totals.entry((sample.cpu, sample.ts)).or_insert((0.0, 0, 0));
        total.0 += percentage;
        total.1 += delta;
        total.2 = time_slice;
    }

    let mut rows: Vec<IdleTimeInStateRow> = state_rows
        .into_iter()
        .map(
            |((_cpu, state, ts), (percentage, residency, time_slice))| IdleTimeInStateRow {
                ts,
                state_name: format!("cpuidle.{state}"),
                idle_percentage: percentage,
                total_residency: residency,
                time_slice,
            },
        )
        .collect();

    // Complementary active rows close each timestamp's percentages to 100.
    rows.extend(totals.into_iter().map(
        |((_cpu, ts), (pct_sum, delta_sum, time_slice))| IdleTimeInStateRow {
            ts,
            state_name: "cpuidle.C0".into(),
            idle_percentage: 100.0 - pct_sum,
            total_residency: (time_slice - delta_sum) as f64,
            time_slice,
        },
    ));

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::build_segments;

    fn sample(ts: i64, cpu: i32, state: &str, duration_us: i64) -> IdleResidencySampleRecord {
        IdleResidencySampleRecord {
            ts,
            cpu,
            state: state.to_string(),
            duration_us,
        }
    }

    #[test]
    fn test_open_idle_episode_excluded() {
        // Active then idle, idle never exits before trace end.
        let segments =
            build_segments([(0, IDLE_STATE_ACTIVE), (1_000, 1)], 5_000, "cpu0 idle").unwrap();
        let window = ReportWindow { start: 0, end: 5_000 };
        let rows = idle_stats_for_cpu(0, &segments, &window);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_closed_episodes_counted_per_state() {
        let segments = build_segments(
            [
                (0, IDLE_STATE_ACTIVE),
                (100, 1),
                (300, IDLE_STATE_ACTIVE),
                (400, 2),
                (500, IDLE_STATE_ACTIVE),
            ],
            1_000,
            "cpu0 idle",
        )
        .unwrap();
        let window = ReportWindow { start: 0, end: 1_000 };
        let rows = idle_stats_for_cpu(0, &segments, &window);
        assert_eq!(rows.len(), 2);
        // Raw state 1 reports as state 2.
        assert_eq!(rows[0].state, 2);
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[0].dur, 200);
        assert_eq!(rows[0].avg_dur, 200);
        assert!((rows[0].idle_percent - 20.0).abs() < 1e-9);
        assert_eq!(rows[1].state, 3);
        assert_eq!(rows[1].dur, 100);
    }

    #[test]
    fn test_idle_stats_window_clipping() {
        let segments = build_segments(
            [(0, 1), (400, IDLE_STATE_ACTIVE)],
            1_000,
            "cpu0 idle",
        )
        .unwrap();
        // Window covers half of the 400ns episode.
        let window = ReportWindow { start: 200, end: 1_000 };
        let rows = idle_stats_for_cpu(0, &segments, &window);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dur, 200);
        // Observed span inside the window is 800ns.
        assert!((rows[0].idle_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_sample_produces_no_row() {
        let rows = idle_time_in_state_rows(&[sample(1_000_000_000, 0, "C8", 500)]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_residency_deltas_and_c0_complement() {
        let rows = idle_time_in_state_rows(&[
            sample(200_000_000_000, 0, "C8", 1_000_000),
            sample(200_001_000_000, 0, "C8", 1_000_100),
            sample(200_002_000_000, 0, "C8", 1_000_200),
        ])
        .unwrap();

        let c8: Vec<_> = rows.iter().filter(|r| r.state_name == "cpuidle.C8").collect();
        let c0: Vec<_> = rows.iter().filter(|r| r.state_name == "cpuidle.C0").collect();
        assert_eq!(c8.len(), 2);
        assert_eq!(c0.len(), 2);
        for row in &c8 {
            assert!((row.idle_percentage - 10.0).abs() < 1e-9);
            assert!((row.total_residency - 100.0).abs() < 1e-9);
            assert_eq!(row.time_slice, 1_000);
        }
        for row in &c0 {
            assert!((row.idle_percentage - 90.0).abs() < 1e-9);
            assert!((row.total_residency - 900.0).abs() < 1e-9);
            assert_eq!(row.time_slice, 1_000);
        }
    }

    #[test]
    fn test_percentages_close_to_100_across_states() {
        let rows = idle_time_in_state_rows(&[
            sample(0, 0, "C6", 0),
            sample(0, 0, "C8", 0),
            sample(2_000_000_000, 0, "C6", 300),
            sample(2_000_000_000, 0, "C8", 500),
        ])
        .unwrap();
        let total: f64 = rows
            .iter()
            .filter(|r| r.ts == 2_000_000_000)
            .map(|r| r.idle_percentage)
            .sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_backwards_sample_rejected() {
        let err = idle_time_in_state_rows(&[
            sample(2_000_000_000, 0, "C8", 100),
            sample(1_000_000_000, 0, "C8", 200),
        ])
        .unwrap_err();
        assert!(matches!(err, MetricsError::MalformedStream { .. }));
    }

    #[test]
    fn test_counter_reset_skipped() {
        let rows = idle_time_in_state_rows(&[
            sample(0, 0, "C8", 1_000),
            sample(1_000_000_000, 0, "C8", 500),
        ])
        .unwrap();
        assert!(rows.is_empty());
    }
}
