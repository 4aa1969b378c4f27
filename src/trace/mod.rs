//! Shared trace data types.
//!
//! This module provides the canonical data types exchanged with the trace
//! decoder (input records) and the query layer (output rows). Keeping them
//! in one place ensures the two sides of the engine agree on units:
//! nanosecond timestamps, kHz frequencies, microsecond residency counters.
//!
//! # Module Organization
//!
//! - [`models`]: Input record structs and output row structs

pub mod models;

// Re-export commonly used types
pub use models::*;
