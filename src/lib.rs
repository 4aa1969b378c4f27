//! Tracestat library - CPU statistics derivation from decoded traces.
//!
//! The input is what a trace decoder hands over: per-CPU frequency and
//! idle edge events, thread scheduling slices, cumulative idle-residency
//! counter samples, and the trace bounds. The output is normalized
//! statistics: per-second utilization, frequency-integrated cycle
//! accounting, and idle-state residency, sliced by CPU, thread, process,
//! or an arbitrary caller interval.
//!
//! The engine is a pure batch computation. It owns no state across
//! queries, does no I/O, and produces identical rows for identical
//! inputs. Trace parsing, query execution and presentation live in
//! collaborating components.
//!
//! # Modules
//!
//! - [`trace`] - Input records and output row types
//! - [`timeline`] - Edge events to piecewise-constant segments
//! - [`interval`] - Report windows and exact overlap arithmetic
//! - [`utilization`] - Runtime and cycle accounting
//! - [`idle`] - Edge-based and counter-based idle residency
//! - [`engine`] - The query entry points
//!
//! # Example
//!
//! ```
//! use tracestat::{SchedSliceRecord, TraceBounds, TraceInput, TraceMetrics};
//!
//! let input = TraceInput {
//!     bounds: TraceBounds { start: 0, end: 2_000_000_000 },
//!     sched_slices: vec![SchedSliceRecord {
//!         ts: 250_000_000,
//!         dur: 500_000_000,
//!         cpu: 0,
//!         utid: 1,
//!         upid: Some(1),
//!     }],
//!     cpu_count: Some(2),
//!     ..Default::default()
//! };
//! let metrics = TraceMetrics::new(&input)?;
//! let rows = metrics.cpu_utilization_per_second();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].ts, 0);
//! assert_eq!(rows[0].unnormalized_utilization, 0.5);
//! # Ok::<(), tracestat::MetricsError>(())
//! ```

pub mod engine;
pub mod errors;
pub mod idle;
pub mod interval;
pub mod timeline;
pub mod trace;
pub mod utilization;

// Re-export for convenience
pub use engine::TraceMetrics;
pub use errors::MetricsError;
pub use interval::{ReportWindow, NS_PER_SEC};
pub use timeline::Segment;
pub use trace::*;
