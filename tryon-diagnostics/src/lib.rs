//! # Try-On Diagnostics
//!
//! Logging setup and pipeline load profiling for the try-on pipeline.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod pipeline_profiler;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use pipeline_profiler::{LoadLevel, PipelineProfiler, PipelineReport, ProfilerConfig};
