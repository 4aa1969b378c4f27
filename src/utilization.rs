//! Utilization and cycle accounting over scheduler slices.
//!
//! Runtime accounting sums slice/window overlaps. Cycle accounting
//! integrates CPU frequency over the running time: each frequency segment
//! overlapping a running slice contributes `freq_khz * overlap_ns`, which
//! is exactly the fixed-point millicycle unit times 1000. Products are
//! summed in `i128` and divided once at the end, so the result does not
//! depend on segment order and never drifts the way repeated float
//! addition would.

use std::collections::BTreeMap;

use crate::interval::{split_into_seconds, ReportWindow, NS_PER_SEC};
use crate::timeline::{first_overlapping, Segment};
use crate::trace::{CycleRow, SchedSliceRecord, TraceBounds, UtilizationRow};

/// Sum per-second running time for a set of slices, keyed by absolute
/// second bucket. Buckets with zero runtime are never created.
pub(crate) fn runtime_per_second<'a>(
    slices: impl IntoIterator<Item = &'a SchedSliceRecord>,
    bounds: &TraceBounds,
) -> BTreeMap<i64, i64> {
    let mut buckets: BTreeMap<i64, i64> = BTreeMap::new();
    for slice in slices {
        let start = slice.ts.max(bounds.start);
        let end = slice.end(bounds).min(bounds.end);
        for (bucket, piece) in split_into_seconds(start, end) {
            *buckets.entry(bucket).or_default() += piece;
        }
    }
    buckets
}

/// Turn per-second runtime buckets into utilization rows.
///
/// `unnormalized_utilization` divides by the fixed one-second bucket
/// width (also for partial edge seconds, so fractions stay comparable
/// across buckets); `utilization` additionally divides by the CPU count.
pub(crate) fn utilization_rows(buckets: BTreeMap<i64, i64>, cpu_count: u32) -> Vec<UtilizationRow> {
    let cpus = cpu_count.max(1) as f64;
    buckets
        .into_iter()
        .filter(|&(_, runtime)| runtime > 0)
        .map(|(ts, runtime)| {
            let unnormalized = runtime as f64 / NS_PER_SEC as f64;
            UtilizationRow {
                ts,
                utilization: unnormalized / cpus,
                unnormalized_utilization: unnormalized,
            }
        })
        .collect()
}

/// Total running time of a set of slices restricted to one window.
pub(crate) fn runtime_in_window<'a>(
    slices: impl IntoIterator<Item = &'a SchedSliceRecord>,
    bounds: &TraceBounds,
    window: &ReportWindow,
) -> i64 {
    let mut runtime = 0;
    for slice in slices {
        let overlap = window.overlap(slice.ts, slice.end(bounds));
        if overlap > 0 {
            runtime += overlap;
        }
    }
    runtime
}

/// Running accumulator for cycle accounting over one (entity, window).
///
/// Merging two accumulators is plain addition plus min/max, so partial
/// results computed independently per entity can be reduced in any order.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CycleAccumulator {
    /// Sum of `freq_khz * overlap_ns` products, exact.
    weighted_freq: i128,
    /// Sum of running time that had frequency coverage, in ns.
    runtime: i64,
    min_freq: i64,
    max_freq: i64,
}

impl Default for CycleAccumulator {
    fn default() -> Self {
        CycleAccumulator {
            weighted_freq: 0,
            runtime: 0,
            min_freq: i64::MAX,
            max_freq: i64::MIN,
        }
    }
}

impl CycleAccumulator {
    /// Fold one running range `[start, end)` against a CPU's frequency
    /// timeline, restricted to `window`.
    ///
    /// Running time before the CPU's first frequency segment has no known
    /// frequency and contributes nothing.
    pub(crate) fn add_running_range(
        &mut self,
        start: i64,
        end: i64,
        freq_segments: &[Segment],
        window: &ReportWindow,
    ) {
        let start = start.max(window.start);
        let end = end.min(window.end);
        if end <= start {
            return;
        }
        for seg in &freq_segments[first_overlapping(freq_segments, start)..] {
            if seg.start >= end {
                break;
            }
            let overlap = seg.end.min(end) - seg.start.max(start);
            if overlap <= 0 {
                continue;
            }
            self.weighted_freq += seg.value as i128 * overlap as i128;
            self.runtime += overlap;
            self.min_freq = self.min_freq.min(seg.value);
            self.max_freq = self.max_freq.max(seg.value);
        }
    }

    pub(crate) fn merge(&mut self, other: &CycleAccumulator) {
        self.weighted_freq += other.weighted_freq;
        self.runtime += other.runtime;
        self.min_freq = self.min_freq.min(other.min_freq);
        self.max_freq = self.max_freq.max(other.max_freq);
    }

    /// Finish the accumulation. `None` when no running time overlapped
    /// any frequency segment; such rows are omitted from output.
    pub(crate) fn finish(&self) -> Option<CycleRow> {
        if self.runtime <= 0 {
            return None;
        }
        let millicycles = (self.weighted_freq / 1000) as i64;
        Some(CycleRow {
            millicycles,
            megacycles: millicycles / 1_000_000_000,
            runtime: self.runtime,
            min_freq: self.min_freq,
            max_freq: self.max_freq,
            avg_freq: (self.weighted_freq / self.runtime as i128) as i64,
        })
    }
}
