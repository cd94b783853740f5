use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Set of OS thread ids that have performed a tracked operation.
#[derive(Default)]
pub struct ThreadTracker {
    ids: Mutex<BTreeSet<u64>>,
}

impl ThreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the calling thread. Repeated calls from one thread are no-ops.
    pub fn record_current_thread(&self) {
        self.record(current_thread_id());
    }

    pub fn record(&self, id: u64) {
        self.ids.lock().insert(id);
    }

    /// Number of distinct threads seen, plus their ids in ascending order.
    pub fn snapshot(&self) -> (usize, Vec<u64>) {
        let ids = self.ids.lock();
        (ids.len(), ids.iter().copied().collect())
    }
}

/// Kernel thread id of the caller.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> u64 {
    // SAFETY: gettid has no preconditions and cannot fail.
    unsafe { libc::gettid() as u64 }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn current_thread_id() -> u64 {
    // SAFETY: pthread_self has no preconditions and cannot fail.
    unsafe { libc::pthread_self() as u64 }
}

#[cfg(not(unix))]
pub fn current_thread_id() -> u64 {
    use std::hash::{Hash, Hasher};

    let mut h = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut h);
    h.finish()
}
