use thiserror::Error;

use crate::metrics::Handle;

/// Everything that can go wrong outside the hot path.
///
/// Recording itself never fails; these come from registration, lookups,
/// and reporter/sink setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("stat name must not be empty")]
    EmptyName,

    #[error("registry is full ({capacity} entries)")]
    RegistryFull { capacity: usize },

    #[error("no entry for handle {0}")]
    NotFound(Handle),

    #[error("latency log is already open")]
    SinkAlreadyOpen,

    #[error("reporter already started")]
    ReporterAlreadyStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
