use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, TelemetryError};
use crate::metrics::{
    Handle, LogSink, Measurement, PayloadSizeHistogram, Registry, Reporter, ReporterHandle,
    SecondStat, StatItem, Target, ThreadTracker, Token, REGISTRY_CAPACITY,
};

// ─── Configuration ───────────────────────────────────────────────

/// Where reports go unless told otherwise
pub const DEFAULT_LOG_PATH: &str = "/tmp/zenfs_latency.log";

/// How often the reporter wakes up
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-second stats are reported this many seconds after the fact, so the
/// second being printed is no longer receiving writes
pub const REPORT_LAG_SECS: i64 = 2;

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    pub log_path: PathBuf,
    pub report_interval: Duration,
    pub report_lag_secs: i64,
    /// Start the reporter on the first completed measurement
    pub auto_start: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            report_interval: REPORT_INTERVAL,
            report_lag_secs: REPORT_LAG_SECS,
            auto_start: true,
        }
    }
}

// ─── Public types ────────────────────────────────────────────────

/// Process-scoped latency instrumentation.
///
/// Owns every registry and accumulator. Cloning is cheap and every clone
/// shares the same state, so one instance is built at startup and handed to
/// call sites; tests build as many isolated instances as they like.
#[derive(Clone)]
pub struct Telemetry {
    shared: Arc<Shared>,
}

/// State shared between call sites and the reporter.
pub(crate) struct Shared {
    pub(crate) options: TelemetryOptions,
    pub(crate) targets: Registry<Target>,
    pub(crate) stats: Registry<StatItem>,
    pub(crate) payload: PayloadSizeHistogram,
    pub(crate) threads: ThreadTracker,
    pub(crate) sink: LogSink,
    /// One-time setup gate: flipped by whoever starts the reporter first
    started: AtomicBool,
    /// Checked by the reporter on every tick
    pub(crate) stop: AtomicBool,
}

impl Telemetry {
    pub fn new(options: TelemetryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                targets: Registry::with_capacity(REGISTRY_CAPACITY),
                stats: Registry::with_capacity(REGISTRY_CAPACITY),
                payload: PayloadSizeHistogram::new(),
                threads: ThreadTracker::new(),
                sink: LogSink::new(),
                started: AtomicBool::new(false),
                stop: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &TelemetryOptions {
        &self.shared.options
    }

    // ── Target registry / recorder ──────────────────────────────

    /// Register an aggregate-counter target. Callers should keep the handle
    /// and treat an error as "recording disabled for this point".
    pub fn register_target(&self, name: &str) -> Result<Handle> {
        self.shared.targets.allocate(name, Target::new())
    }

    pub fn target(&self, handle: Handle) -> Result<&Target> {
        self.shared.targets.resolve(handle)
    }

    pub fn target_name(&self, handle: Handle) -> Option<&str> {
        self.shared.targets.name(handle)
    }

    #[inline]
    pub fn begin(&self, handle: Handle) -> Token {
        Token::new(handle)
    }

    /// Finish a measurement started with [`begin`](Self::begin).
    ///
    /// Never fails and never blocks. The first call for a registered target
    /// on an auto-starting instance also starts the reporter; tokens for
    /// unknown handles are dropped without side effects.
    #[inline]
    pub fn end(&self, token: Token) {
        let Some(target) = self.shared.targets.get(token.handle()) else {
            return;
        };
        target.record(token.start.elapsed());
        if self.shared.options.auto_start && !self.shared.started.load(Ordering::Relaxed) {
            self.auto_start();
        }
    }

    /// Record an already measured duration. Unknown handles are ignored.
    #[inline]
    pub fn record(&self, handle: Handle, elapsed: Duration) {
        if let Some(target) = self.shared.targets.get(handle) {
            target.record(elapsed);
        }
    }

    /// Run `f` between `begin` and `end`.
    pub fn time<R>(&self, handle: Handle, f: impl FnOnce() -> R) -> R {
        let token = self.begin(handle);
        let out = f();
        self.end(token);
        out
    }

    #[inline]
    pub fn record_payload(&self, bytes: u64) {
        self.shared.payload.record(bytes);
    }

    pub fn track_current_thread(&self) {
        self.shared.threads.record_current_thread();
    }

    pub fn tracked_threads(&self) -> (usize, Vec<u64>) {
        self.shared.threads.snapshot()
    }

    // ── Dynamic stat registry ───────────────────────────────────

    pub fn alloc_stat(&self, name: &str) -> Result<Handle> {
        self.shared.stats.allocate(name, StatItem::new(None))
    }

    /// Allocate a stat whose latency is reported as a share of `parent`'s.
    pub fn alloc_child_stat(&self, name: &str, parent: Handle) -> Result<Handle> {
        self.shared.stats.resolve(parent)?;
        self.shared.stats.allocate(name, StatItem::new(Some(parent)))
    }

    pub fn stat(&self, handle: Handle) -> Result<&StatItem> {
        self.shared.stats.resolve(handle)
    }

    pub fn stat_name(&self, handle: Handle) -> Option<&str> {
        self.shared.stats.name(handle)
    }

    /// Add one observation to a stat item. Unknown handles are ignored.
    pub fn add_measurement(&self, handle: Handle, second: i64, duration_us: u64) {
        if let Some(item) = self.shared.stats.get(handle) {
            item.add_measurement(second, duration_us);
        }
    }

    pub fn second_stat(&self, handle: Handle, second: i64) -> Option<SecondStat> {
        self.shared.stats.get(handle)?.second_stat(second)
    }

    pub fn remove_second_stat(&self, handle: Handle, second: i64) -> Option<SecondStat> {
        self.shared.stats.get(handle)?.remove_second_stat(second)
    }

    /// Time the enclosing scope into a stat item.
    pub fn measure(&self, handle: Handle) -> Measurement<'_> {
        Measurement::new(self.shared.stats.get(handle))
    }

    // ── Reporter lifecycle ──────────────────────────────────────

    /// Start the reporter explicitly. Fails if it is already running,
    /// whether started here or by a first measurement. If the thread cannot
    /// be spawned the instance stays unstarted and `start` may be retried.
    pub fn start(&self) -> Result<ReporterHandle> {
        self.start_with(Reporter::spawn)
    }

    fn start_with(
        &self,
        spawn: impl FnOnce(Arc<Shared>) -> Result<ReporterHandle>,
    ) -> Result<ReporterHandle> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(TelemetryError::ReporterAlreadyStarted);
        }
        spawn(self.shared.clone()).inspect_err(|e| {
            warn!(error = %e, "cannot start latency reporter");
            self.shared.started.store(false, Ordering::Release);
        })
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// Ask a running reporter to exit at its next tick.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Build a reporter over this instance's state without spawning it.
    /// The caller drives it, e.g. on its own runtime.
    pub fn reporter(&self) -> Reporter {
        Reporter::new(self.shared.clone())
    }

    #[cold]
    fn auto_start(&self) {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return;
        }
        // Runs for the rest of the process, unjoined. A failure to spawn
        // only disables reporting; the measured code must not notice.
        if let Ok(handle) = Reporter::spawn(self.shared.clone()) {
            handle.detach();
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryOptions::default())
    }
}
