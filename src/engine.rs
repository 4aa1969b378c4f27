//! Query entry points over one decoded trace.
//!
//! [`TraceMetrics`] borrows a [`TraceInput`], builds the per-CPU
//! frequency and idle timelines once, and answers every statistic from
//! them. Construction validates the streams (ordering, entity ids); a
//! corrupt stream rejects the whole trace rather than aggregating over
//! bad data.
//!
//! Per-entity work is independent, so the per-CPU / per-thread /
//! per-process queries fan out with rayon and merge their accumulators
//! afterwards; merging is plain addition and min/max, so the reduction
//! order does not matter. Output rows are sorted by entity key so results
//! are deterministic regardless of worker scheduling.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::errors::MetricsError;
use crate::idle::{idle_stats_for_cpu, idle_time_in_state_rows};
use crate::interval::{validate_interval, ReportWindow};
use crate::timeline::{build_segments, Segment};
use crate::trace::{
    CpuCycleRow, CycleRow, FreqCounterRow, IdleCounterRow, IdleStatRow, IdleTimeInStateRow,
    ProcessCycleRow, SchedSliceRecord, ThreadCycleRow, TraceInput, UtilizationRow,
};
use crate::utilization::{
    runtime_in_window, runtime_per_second, utilization_rows, CycleAccumulator,
};

/// Metrics engine for one trace. All queries are pure functions of the
/// input streams: re-evaluating any of them yields identical rows.
#[derive(Debug)]
pub struct TraceMetrics<'a> {
    input: &'a TraceInput,
    freq_timelines: BTreeMap<i32, Vec<Segment>>,
    idle_timelines: BTreeMap<i32, Vec<Segment>>,
    slices_by_cpu: BTreeMap<i32, Vec<SchedSliceRecord>>,
    slices_by_utid: BTreeMap<i64, Vec<SchedSliceRecord>>,
    slices_by_upid: BTreeMap<i64, Vec<SchedSliceRecord>>,
    cpu_count: u32,
}

impl<'a> TraceMetrics<'a> {
    /// Build the engine, validating every stream up front.
    pub fn new(input: &'a TraceInput) -> Result<TraceMetrics<'a>, MetricsError> {
        let mut max_cpu: i32 = -1;

        let mut freq_by_cpu: BTreeMap<i32, Vec<(i64, i64)>> = BTreeMap::new();
        for event in &input.freq_events {
            if event.cpu < 0 {
                return Err(MetricsError::malformed(format!(
                    "frequency event at {} references unknown cpu {}",
                    event.ts, event.cpu
                )));
            }
            max_cpu = max_cpu.max(event.cpu);
            freq_by_cpu
                .entry(event.cpu)
                .or_default()
                .push((event.ts, event.freq_khz));
        }

        let mut idle_by_cpu: BTreeMap<i32, Vec<(i64, i64)>> = BTreeMap::new();
        for event in &input.idle_events {
            if event.cpu < 0 {
                return Err(MetricsError::malformed(format!(
                    "idle event at {} references unknown cpu {}",
                    event.ts, event.cpu
                )));
            }
            max_cpu = max_cpu.max(event.cpu);
            idle_by_cpu
                .entry(event.cpu)
                .or_default()
                .push((event.ts, event.state));
        }

        let mut slices_by_cpu: BTreeMap<i32, Vec<SchedSliceRecord>> = BTreeMap::new();
        let mut slices_by_utid: BTreeMap<i64, Vec<SchedSliceRecord>> = BTreeMap::new();
        let mut slices_by_upid: BTreeMap<i64, Vec<SchedSliceRecord>> = BTreeMap::new();
        for slice in &input.sched_slices {
            if slice.cpu < 0 || slice.utid < 0 {
                return Err(MetricsError::malformed(format!(
                    "sched slice at {} references unknown entity (cpu {}, utid {})",
                    slice.ts, slice.cpu, slice.utid
                )));
            }
            max_cpu = max_cpu.max(slice.cpu);
            slices_by_cpu.entry(slice.cpu).or_default().push(*slice);
            slices_by_utid.entry(slice.utid).or_default().push(*slice);
            if let Some(upid) = slice.upid {
                slices_by_upid.entry(upid).or_default().push(*slice);
            }
        }

        let trace_end = input.bounds.end;
        let freq_timelines = freq_by_cpu
            .into_iter()
            .map(|(cpu, events)| {
                build_segments(events, trace_end, &format!("cpu{cpu} frequency"))
                    .map(|segments| (cpu, segments))
            })
            .collect::<Result<_, _>>()?;
        let idle_timelines = idle_by_cpu
            .into_iter()
            .map(|(cpu, events)| {
                build_segments(events, trace_end, &format!("cpu{cpu} idle"))
                    .map(|segments| (cpu, segments))
            })
            .collect::<Result<_, _>>()?;

        let cpu_count = input.cpu_count.unwrap_or((max_cpu + 1).max(1) as u32);

        Ok(TraceMetrics {
            input,
            freq_timelines,
            idle_timelines,
            slices_by_cpu,
            slices_by_utid,
            slices_by_upid,
            cpu_count,
        })
    }

    /// Number of CPUs used to normalize utilization fractions.
    pub fn cpu_count(&self) -> u32 {
        self.cpu_count
    }

    fn whole_trace(&self) -> ReportWindow {
        ReportWindow {
            start: self.input.bounds.start,
            end: self.input.bounds.end,
        }
    }

    // Utilization.

    /// System-wide per-second utilization over the whole trace. Seconds
    /// with zero running time are omitted.
    pub fn cpu_utilization_per_second(&self) -> Vec<UtilizationRow> {
        utilization_rows(
            runtime_per_second(&self.input.sched_slices, &self.input.bounds),
            self.cpu_count,
        )
    }

    /// Per-second utilization of one thread. An unseen `utid` yields no
    /// rows; the entity is simply absent.
    pub fn cpu_thread_utilization_per_second(&self, utid: i64) -> Vec<UtilizationRow> {
        let Some(slices) = self.slices_by_utid.get(&utid) else {
            return Vec::new();
        };
        utilization_rows(
            runtime_per_second(slices, &self.input.bounds),
            self.cpu_count,
        )
    }

    /// Per-second utilization of one process, aggregated across its
    /// threads.
    pub fn cpu_process_utilization_per_second(&self, upid: i64) -> Vec<UtilizationRow> {
        let Some(slices) = self.slices_by_upid.get(&upid) else {
            return Vec::new();
        };
        utilization_rows(
            runtime_per_second(slices, &self.input.bounds),
            self.cpu_count,
        )
    }

    /// System-wide utilization over one caller interval. `None` when no
    /// running time overlapped the interval.
    pub fn cpu_utilization_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Option<UtilizationRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        let runtime = runtime_in_window(&self.input.sched_slices, &self.input.bounds, &window);
        if runtime == 0 {
            return Ok(None);
        }
        let unnormalized = runtime as f64 / window.dur() as f64;
        Ok(Some(UtilizationRow {
            ts: window.start,
            utilization: unnormalized / self.cpu_count.max(1) as f64,
            unnormalized_utilization: unnormalized,
        }))
    }

    // Cycle accounting.

    fn cycles_for_cpu(&self, cpu: i32, slices: &[SchedSliceRecord], window: &ReportWindow) -> CycleAccumulator {
        let mut acc = CycleAccumulator::default();
        if let Some(freq) = self.freq_timelines.get(&cpu) {
            for slice in slices {
                acc.add_running_range(slice.ts, slice.end(&self.input.bounds), freq, window);
            }
        }
        acc
    }

    fn system_cycles(&self, window: &ReportWindow) -> Option<CycleRow> {
        self.slices_by_cpu
            .par_iter()
            .map(|(&cpu, slices)| self.cycles_for_cpu(cpu, slices, window))
            .reduce(CycleAccumulator::default, |mut a, b| {
                a.merge(&b);
                a
            })
            .finish()
    }

    /// System-wide cycle accounting over the whole trace. `None` when no
    /// running time had frequency coverage.
    pub fn cpu_cycles(&self) -> Option<CycleRow> {
        self.system_cycles(&self.whole_trace())
    }

    /// System-wide cycle accounting restricted to one caller interval.
    pub fn cpu_cycles_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Option<CycleRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        Ok(self.system_cycles(&window))
    }

    fn per_cpu_cycles(&self, window: &ReportWindow) -> Vec<CpuCycleRow> {
        let mut rows: Vec<CpuCycleRow> = self
            .slices_by_cpu
            .par_iter()
            .filter_map(|(&cpu, slices)| {
                self.cycles_for_cpu(cpu, slices, window)
                    .finish()
                    .map(|row| CpuCycleRow {
                        cpu,
                        millicycles: row.millicycles,
                        megacycles: row.megacycles,
                        runtime: row.runtime,
                        min_freq: row.min_freq,
                        max_freq: row.max_freq,
                        avg_freq: row.avg_freq,
                    })
            })
            .collect();
        rows.sort_by_key(|row| row.cpu);
        rows
    }

    /// Cycle accounting per CPU over the whole trace, sorted by CPU.
    /// CPUs with no covered running time are omitted.
    pub fn cpu_cycles_per_cpu(&self) -> Vec<CpuCycleRow> {
        self.per_cpu_cycles(&self.whole_trace())
    }

    /// Cycle accounting per CPU restricted to one caller interval.
    pub fn cpu_cycles_per_cpu_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Vec<CpuCycleRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        Ok(self.per_cpu_cycles(&window))
    }

    fn per_thread_cycles(&self, window: &ReportWindow) -> Vec<ThreadCycleRow> {
        let mut rows: Vec<ThreadCycleRow> = self
            .slices_by_utid
            .par_iter()
            .filter_map(|(&utid, slices)| {
                let mut acc = CycleAccumulator::default();
                for slice in slices {
                    if let Some(freq) = self.freq_timelines.get(&slice.cpu) {
                        acc.add_running_range(
                            slice.ts,
                            slice.end(&self.input.bounds),
                            freq,
                            window,
                        );
                    }
                }
                acc.finish().map(|row| ThreadCycleRow {
                    utid,
                    millicycles: row.millicycles,
                    megacycles: row.megacycles,
                    runtime: row.runtime,
                    min_freq: row.min_freq,
                    max_freq: row.max_freq,
                    avg_freq: row.avg_freq,
                })
            })
            .collect();
        rows.sort_by_key(|row| row.utid);
        rows
    }

    /// Cycle accounting per thread over the whole trace, sorted by utid.
    /// The thread's slices are attributed to the CPU they ran on.
    pub fn cpu_cycles_per_thread(&self) -> Vec<ThreadCycleRow> {
        self.per_thread_cycles(&self.whole_trace())
    }

    /// Cycle accounting per thread restricted to one caller interval.
    pub fn cpu_cycles_per_thread_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Vec<ThreadCycleRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        Ok(self.per_thread_cycles(&window))
    }

    fn per_process_cycles(&self, window: &ReportWindow) -> Vec<ProcessCycleRow> {
        let mut rows: Vec<ProcessCycleRow> = self
            .slices_by_upid
            .par_iter()
            .filter_map(|(&upid, slices)| {
                let mut acc = CycleAccumulator::default();
                for slice in slices {
                    if let Some(freq) = self.freq_timelines.get(&slice.cpu) {
                        acc.add_running_range(
                            slice.ts,
                            slice.end(&self.input.bounds),
                            freq,
                            window,
                        );
                    }
                }
                acc.finish().map(|row| ProcessCycleRow {
                    upid,
                    millicycles: row.millicycles,
                    megacycles: row.megacycles,
                    runtime: row.runtime,
                    min_freq: row.min_freq,
                    max_freq: row.max_freq,
                    avg_freq: row.avg_freq,
                })
            })
            .collect();
        rows.sort_by_key(|row| row.upid);
        rows
    }

    /// Cycle accounting per process over the whole trace, sorted by upid.
    pub fn cpu_cycles_per_process(&self) -> Vec<ProcessCycleRow> {
        self.per_process_cycles(&self.whole_trace())
    }

    /// Cycle accounting per process restricted to one caller interval.
    pub fn cpu_cycles_per_process_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Vec<ProcessCycleRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        Ok(self.per_process_cycles(&window))
    }

    // Idle statistics.

    fn idle_stats(&self, window: &ReportWindow) -> Vec<IdleStatRow> {
        let mut per_cpu: Vec<(i32, Vec<IdleStatRow>)> = self
            .idle_timelines
            .par_iter()
            .map(|(&cpu, segments)| (cpu, idle_stats_for_cpu(cpu, segments, window)))
            .collect();
        per_cpu.sort_by_key(|(cpu, _)| *cpu);
        per_cpu.into_iter().flat_map(|(_, rows)| rows).collect()
    }

    /// Edge-based idle statistics per (cpu, state) over the whole trace.
    pub fn cpu_idle_stats(&self) -> Vec<IdleStatRow> {
        self.idle_stats(&self.whole_trace())
    }

    /// Edge-based idle statistics restricted to one caller interval.
    pub fn cpu_idle_stats_in_interval(
        &self,
        start: i64,
        dur: i64,
    ) -> Result<Vec<IdleStatRow>, MetricsError> {
        let window = validate_interval(&self.input.bounds, start, dur)?;
        Ok(self.idle_stats(&window))
    }

    /// Counter-based idle time-in-state rows from the cumulative
    /// residency samples.
    pub fn cpu_idle_time_in_state_counters(
        &self,
    ) -> Result<Vec<IdleTimeInStateRow>, MetricsError> {
        idle_time_in_state_rows(&self.input.idle_residency_samples)
    }

    // Counter timelines.

    /// The per-CPU frequency timeline as counter rows, sorted by
    /// (cpu, ts). Zero-length spans are dropped.
    pub fn cpu_frequency_counters(&self) -> Vec<FreqCounterRow> {
        self.freq_timelines
            .iter()
            .flat_map(|(&cpu, segments)| {
                segments.iter().filter(|seg| seg.dur() > 0).map(move |seg| {
                    FreqCounterRow {
                        ts: seg.start,
                        dur: seg.dur(),
                        cpu,
                        freq: seg.value,
                    }
                })
            })
            .collect()
    }

    /// The per-CPU idle timeline as counter rows, sorted by (cpu, ts).
    /// `idle` is the raw state value, -1 while the CPU was active.
    pub fn cpu_idle_counters(&self) -> Vec<IdleCounterRow> {
        self.idle_timelines
            .iter()
            .flat_map(|(&cpu, segments)| {
                segments.iter().filter(|seg| seg.dur() > 0).map(move |seg| {
                    IdleCounterRow {
                        ts: seg.start,
                        dur: seg.dur(),
                        cpu,
                        idle: seg.value,
                    }
                })
            })
            .collect()
    }
}
