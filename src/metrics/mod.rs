pub mod histogram;
pub mod percentiles;
pub mod recorder;
pub mod registry;
pub mod reporter;
pub mod sink;
pub mod stat;
pub mod threads;

use std::fmt;

pub use histogram::{Bucket, LatencyHistogram, PayloadSizeHistogram};
pub use percentiles::PercentileSet;
pub use recorder::{Target, TargetDelta, Token};
pub use registry::Registry;
pub use reporter::{Reporter, ReporterHandle};
pub use sink::LogSink;
pub use stat::{Measurement, SecondStat, StatItem};
pub use threads::ThreadTracker;

/// Maximum number of entries in any registry.
pub const REGISTRY_CAPACITY: usize = 1024;

/// Opaque, stable identifier for a registered target or stat item.
///
/// Handles are dense indices handed out in allocation order and stay valid
/// for the lifetime of the registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Sentinel returned when registration fails. Recording against it is a no-op.
    pub const INVALID: Handle = Handle(u32::MAX);

    pub(crate) fn from_index(index: usize) -> Self {
        u32::try_from(index).map(Handle).unwrap_or(Self::INVALID)
    }

    /// Convert a raw integer (possibly negative) into a handle.
    /// Anything that cannot name a slot collapses to [`Handle::INVALID`].
    pub fn from_raw(raw: i64) -> Self {
        match u32::try_from(raw) {
            Ok(v) if v != u32::MAX => Handle(v),
            _ => Self::INVALID,
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_oversized_raw_handles_are_invalid() {
        assert_eq!(Handle::from_raw(-1), Handle::INVALID);
        assert_eq!(Handle::from_raw(i64::from(u32::MAX)), Handle::INVALID);
        assert_eq!(Handle::from_raw(i64::MAX), Handle::INVALID);
        assert_eq!(Handle::from_raw(7).index(), 7);
    }
}
