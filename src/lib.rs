//! In-process latency instrumentation for storage call paths.
//!
//! Two recording paths share one [`Telemetry`] context:
//!
//! * **targets** — wait-free aggregate counters plus a two-resolution latency
//!   histogram, updated with [`Telemetry::begin`] / [`Telemetry::end`];
//! * **stat items** — per-second latency distributions with percentile
//!   estimation and parent/child attribution, fed through
//!   [`Telemetry::measure`] or [`Telemetry::add_measurement`].
//!
//! A background reporter drains both once a second and appends a
//! human-readable report to the latency log.

pub mod error;
pub mod metrics;
pub mod telemetry;

pub use error::{Result, TelemetryError};
pub use metrics::{Handle, PercentileSet, SecondStat};
pub use telemetry::{Telemetry, TelemetryOptions};
