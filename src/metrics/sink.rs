use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::{Result, TelemetryError};

/// Append-only report file. Opened at most once; later opens are refused
/// and leave the existing file in place.
#[derive(Default)]
pub struct LogSink {
    inner: OnceLock<Open>,
}

struct Open {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.inner.get().is_some() {
            return Err(TelemetryError::SinkAlreadyOpen);
        }

        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.inner
            .set(Open {
                path: path.to_path_buf(),
                writer: Mutex::new(BufWriter::new(file)),
            })
            .map_err(|_| TelemetryError::SinkAlreadyOpen)
    }

    pub fn is_open(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.get().map(|o| o.path.as_path())
    }

    /// Append one report and flush it. Writing to a sink that was never
    /// opened is a no-op.
    pub fn write_report(&self, report: &str) -> Result<()> {
        let Some(open) = self.inner.get() else {
            return Ok(());
        };
        let mut w = open.writer.lock();
        w.write_all(report.as_bytes())?;
        w.flush()?;
        Ok(())
    }
}
