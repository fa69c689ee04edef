use std::collections::HashMap;
use std::sync::Mutex;

/// One installed mock and its recorded usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockEntry {
    /// Whether the replacement is currently applied to its target.
    pub active: bool,
    /// Calls observed while the replacement was applied.
    pub calls: u64,
}

/// Per-worker registry of installed mocks.
///
/// Two cleanup depths exist. [`MockRegistry::restore_all`] re-applies the
/// original implementations but keeps the entries and their call history;
/// the batch loop runs it after every file. [`MockRegistry::reset_all`]
/// discards the entries entirely and runs as part of the isolation reset
/// before a file starts.
pub struct MockRegistry {
    inner: Mutex<HashMap<String, MockEntry>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Installs a replacement for `target`, overwriting any previous entry
    /// for the same target with a fresh one.
    pub fn install(&self, target: impl Into<String>) {
        self.inner.lock().unwrap().insert(
            target.into(),
            MockEntry {
                active: true,
                calls: 0,
            },
        );
    }

    /// Counts one interception. Returns `false` when no active mock exists
    /// for `target`.
    pub fn record_call(&self, target: &str) -> bool {
        let mut entries = self.inner.lock().unwrap();
        match entries.get_mut(target) {
            Some(entry) if entry.active => {
                entry.calls += 1;
                true
            }
            _ => false,
        }
    }

    pub fn calls(&self, target: &str) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .get(target)
            .map(|entry| entry.calls)
            .unwrap_or(0)
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.active)
            .count()
    }

    pub fn installed_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Re-applies the original implementations while keeping the entries and
    /// their history. Returns how many entries were deactivated.
    pub fn restore_all(&self) -> usize {
        let mut entries = self.inner.lock().unwrap();
        let mut restored = 0;
        for entry in entries.values_mut() {
            if entry.active {
                entry.active = false;
                restored += 1;
            }
        }
        restored
    }

    /// Restores and forgets every entry, history included. Returns how many
    /// entries were dropped.
    pub fn reset_all(&self) -> usize {
        let mut entries = self.inner.lock().unwrap();
        let dropped = entries.len();
        entries.clear();
        dropped
    }
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
