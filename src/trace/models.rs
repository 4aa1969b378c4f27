//! Trace data model structs shared between the decoding collaborator and
//! the metrics engine.
//!
//! Input records are the canonical shape the decoder hands us: already
//! time-ordered, already resolved to unique thread/process ids. Output
//! rows are what the surrounding query layer consumes; they all derive
//! `Serialize` so that layer can emit them as JSON or CSV unchanged.

use serde::Serialize;

/// Idle-state value meaning "CPU is active / not idle".
///
/// The kernel reports idle exit as state 0xffffffff; decoders map that to
/// -1 before the records reach this crate. Genuine idle-state indices are
/// always >= 0.
pub const IDLE_STATE_ACTIVE: i64 = -1;

/// Overall bounds of the trace, in nanoseconds on the trace clock.
///
/// These are two scalars handed down from the decoder, passed explicitly
/// rather than read from ambient state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceBounds {
    pub start: i64,
    pub end: i64,
}

impl TraceBounds {
    pub fn dur(&self) -> i64 {
        self.end - self.start
    }
}

/// CPU frequency change event.
///
/// # Fields
/// - `ts`: Timestamp in nanoseconds (trace clock)
/// - `cpu`: CPU core number the new frequency applies to
/// - `freq_khz`: New frequency in kHz, in effect from `ts` onward
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreqEventRecord {
    pub ts: i64,
    pub cpu: i32,
    pub freq_khz: i64,
}

/// CPU idle-state transition event.
///
/// # Fields
/// - `ts`: Timestamp in nanoseconds (trace clock)
/// - `cpu`: CPU core number
/// - `state`: Idle-state index entered at `ts`, or [`IDLE_STATE_ACTIVE`]
///   when the CPU left idle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdleEventRecord {
    pub ts: i64,
    pub cpu: i32,
    pub state: i64,
}

/// Scheduler slice record - time a thread ran on a CPU.
///
/// # Fields
/// - `ts`: Start timestamp in nanoseconds (trace clock)
/// - `dur`: Duration in nanoseconds; negative if the slice was still
///   open at the end of the trace (it then runs to `TraceBounds::end`)
/// - `cpu`: CPU core number where the thread ran
/// - `utid`: Unique thread ID assigned by the decoder
/// - `upid`: Owning process's unique ID, when known
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedSliceRecord {
    pub ts: i64,
    pub dur: i64,
    pub cpu: i32,
    pub utid: i64,
    pub upid: Option<i64>,
}

impl SchedSliceRecord {
    /// End timestamp, resolving open slices against the trace bounds.
    pub fn end(&self, bounds: &TraceBounds) -> i64 {
        if self.dur < 0 {
            bounds.end
        } else {
            self.ts + self.dur
        }
    }
}

/// Cumulative idle-residency counter sample.
///
/// The kernel exposes, per CPU and idle state, a monotonically
/// non-decreasing "total time spent in this state" counter; the decoder
/// samples it periodically. Interval-local residency requires differencing
/// consecutive samples.
///
/// # Fields
/// - `ts`: Sample timestamp in nanoseconds (trace clock)
/// - `cpu`: CPU core number
/// - `state`: Idle-state name as the kernel reports it (e.g. "C8")
/// - `duration_us`: Cumulative microseconds spent in `state` up to `ts`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdleResidencySampleRecord {
    pub ts: i64,
    pub cpu: i32,
    pub state: String,
    pub duration_us: i64,
}

/// Everything the engine consumes for one trace: the decoded streams plus
/// the trace bounds.
///
/// Streams must be time-ordered per entity (per CPU for events, per
/// (cpu, state) for residency samples); the engine rejects streams that
/// are not. `cpu_count` overrides the normalization divisor for
/// utilization fractions; when `None` it defaults to the highest CPU
/// index observed anywhere in the input plus one.
#[derive(Clone, Debug, Default)]
pub struct TraceInput {
    pub bounds: TraceBounds,
    pub freq_events: Vec<FreqEventRecord>,
    pub idle_events: Vec<IdleEventRecord>,
    pub sched_slices: Vec<SchedSliceRecord>,
    pub idle_residency_samples: Vec<IdleResidencySampleRecord>,
    pub cpu_count: Option<u32>,
}

// Output rows.

/// Per-second utilization row.
///
/// `ts` is the second bucket start (aligned to whole seconds of the trace
/// clock). `unnormalized_utilization` is runtime over one second and may
/// exceed 1.0 when summed across CPUs; `utilization` divides it by the
/// CPU count so 1.0 means the whole machine was busy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct UtilizationRow {
    pub ts: i64,
    pub utilization: f64,
    pub unnormalized_utilization: f64,
}

/// System-wide cycle accounting row.
///
/// `millicycles` is a fixed-point unit (1/1000 of a clock cycle) so cycle
/// accumulation across billions of segment overlaps stays exact;
/// `megacycles` is `millicycles / 1e9` truncated. Frequencies are kHz;
/// `avg_freq` is time-weighted over the running time, not a mean of
/// samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CycleRow {
    pub millicycles: i64,
    pub megacycles: i64,
    pub runtime: i64,
    pub min_freq: i64,
    pub max_freq: i64,
    pub avg_freq: i64,
}

/// Per-CPU cycle accounting row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CpuCycleRow {
    pub cpu: i32,
    pub millicycles: i64,
    pub megacycles: i64,
    pub runtime: i64,
    pub min_freq: i64,
    pub max_freq: i64,
    pub avg_freq: i64,
}

/// Per-thread cycle accounting row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ThreadCycleRow {
    pub utid: i64,
    pub millicycles: i64,
    pub megacycles: i64,
    pub runtime: i64,
    pub min_freq: i64,
    pub max_freq: i64,
    pub avg_freq: i64,
}

/// Per-process cycle accounting row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessCycleRow {
    pub upid: i64,
    pub millicycles: i64,
    pub megacycles: i64,
    pub runtime: i64,
    pub min_freq: i64,
    pub max_freq: i64,
    pub avg_freq: i64,
}

/// Edge-based idle statistics row.
///
/// `state` is the reported state number (raw idle index + 1, matching the
/// kernel tooling convention where state 1 is the shallowest idle state).
/// `idle_percent` is over the window of data observed for that CPU.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IdleStatRow {
    pub cpu: i32,
    pub state: i64,
    pub count: u64,
    pub dur: i64,
    pub avg_dur: i64,
    pub idle_percent: f64,
}

/// Counter-based idle time-in-state row.
///
/// One row per (sample timestamp, state), plus a synthesized
/// `"cpuidle.C0"` active row per timestamp whose percentage complements
/// the real states to exactly 100. `time_slice` is the gap to the prior
/// sample in microseconds, the counters' own unit; `total_residency` is
/// the raw microsecond delta of the cumulative counter over that gap.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IdleTimeInStateRow {
    pub ts: i64,
    pub state_name: String,
    pub idle_percentage: f64,
    pub total_residency: f64,
    pub time_slice: i64,
}

/// One span of the per-CPU frequency timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FreqCounterRow {
    pub ts: i64,
    pub dur: i64,
    pub cpu: i32,
    pub freq: i64,
}

/// One span of the per-CPU idle timeline. `idle` is the raw state value;
/// -1 means the CPU was active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IdleCounterRow {
    pub ts: i64,
    pub dur: i64,
    pub cpu: i32,
    pub idle: i64,
}
