//! # Try-On Core
//!
//! Foundational types shared by every layer of the try-on pipeline: the
//! session-level error type and the resource limits that bound how many
//! concurrent sessions a server will host.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod resource;

// Re-export main types
pub use error::{TryOnError, TryOnResult};
pub use resource::{ResourceWarning, SessionLimits, SessionUsage, WarningSeverity};
