use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use tracing::warn;

use super::Handle;
use crate::error::{Result, TelemetryError};

/// Append-only, fixed-capacity table of named entries.
///
/// Slots are pre-sized at construction so lookups never reallocate and never
/// take a lock: a handle is just an index into `slots`, and a slot becomes
/// visible once its `OnceLock` is set.
pub struct Registry<T> {
    slots: Box<[OnceLock<Entry<T>>]>,
    next: AtomicUsize,
}

struct Entry<T> {
    name: String,
    value: T,
}

impl<T> Registry<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Number of handles handed out so far.
    pub fn len(&self) -> usize {
        self.next.load(Ordering::Acquire).min(self.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve the next slot for `name` and store `value` in it.
    pub fn allocate(&self, name: &str, value: T) -> Result<Handle> {
        if name.is_empty() {
            return Err(TelemetryError::EmptyName);
        }

        let capacity = self.slots.len();
        let index = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| {
                warn!(stat = name, capacity, "registry full, recording disabled for this point");
                TelemetryError::RegistryFull { capacity }
            })?;

        // The index was reserved exclusively above, so the slot is empty.
        let _ = self.slots[index].set(Entry {
            name: name.to_owned(),
            value,
        });
        Ok(Handle::from_index(index))
    }

    /// Look up the value behind `handle`, or `None` for the sentinel,
    /// out-of-range handles, and slots still being filled.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entry(handle).map(|e| &e.value)
    }

    pub fn resolve(&self, handle: Handle) -> Result<&T> {
        self.get(handle).ok_or(TelemetryError::NotFound(handle))
    }

    pub fn name(&self, handle: Handle) -> Option<&str> {
        self.entry(handle).map(|e| e.name.as_str())
    }

    /// Visit allocated entries in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &str, &T)> + '_ {
        self.slots[..self.len()]
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.get()
                    .map(|e| (Handle::from_index(i), e.name.as_str(), &e.value))
            })
    }

    fn entry(&self, handle: Handle) -> Option<&Entry<T>> {
        if !handle.is_valid() {
            return None;
        }
        self.slots.get(handle.index()).and_then(OnceLock::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::REGISTRY_CAPACITY;

    #[test]
    fn handles_are_dense_and_stable() {
        let reg = Registry::with_capacity(4);
        let a = reg.allocate("pread", 1u32).unwrap();
        let b = reg.allocate("pwrite", 2u32).unwrap();

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(reg.get(a), Some(&1));
        assert_eq!(reg.name(b), Some("pwrite"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn empty_name_is_rejected() {
        let reg = Registry::with_capacity(4);
        assert!(matches!(reg.allocate("", ()), Err(TelemetryError::EmptyName)));
        assert!(reg.is_empty());
    }

    #[test]
    fn allocation_past_capacity_fails() {
        let reg = Registry::with_capacity(REGISTRY_CAPACITY);
        for i in 0..REGISTRY_CAPACITY {
            reg.allocate(&format!("target-{i}"), ()).unwrap();
        }

        let err = reg.allocate("one-too-many", ()).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::RegistryFull { capacity } if capacity == REGISTRY_CAPACITY
        ));
        assert_eq!(reg.len(), REGISTRY_CAPACITY);
    }

    #[test]
    fn unknown_handles_resolve_to_not_found() {
        let reg = Registry::with_capacity(2);
        reg.allocate("only", ()).unwrap();

        for h in [Handle::INVALID, Handle::from_raw(-3), Handle::from_raw(1), Handle::from_raw(99)] {
            assert!(matches!(reg.resolve(h), Err(TelemetryError::NotFound(_))));
        }
    }

    #[test]
    fn concurrent_allocation_hands_out_unique_handles() {
        let reg = Registry::with_capacity(REGISTRY_CAPACITY);
        std::thread::scope(|s| {
            for t in 0..8 {
                let reg = &reg;
                s.spawn(move || {
                    for i in 0..200 {
                        let _ = reg.allocate(&format!("t{t}-{i}"), ());
                    }
                });
            }
        });

        assert_eq!(reg.len(), REGISTRY_CAPACITY);
        assert_eq!(reg.iter().count(), REGISTRY_CAPACITY);
    }
}
