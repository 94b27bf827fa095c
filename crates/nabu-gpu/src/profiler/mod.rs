//! GPU pass timing through timestamp queries.

mod timestamp;

pub use timestamp::{PassTiming, ProfilerReport, TimestampProfiler, DEFAULT_CAPACITY};
