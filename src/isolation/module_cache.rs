use std::collections::HashSet;
use std::sync::Mutex;

/// Registry of evaluated module specifiers for one worker.
///
/// The cache tracks identity only. Evicting a specifier makes the next load
/// re-evaluate it; retained identities are runtime-internal modules that must
/// survive every reset so re-registering them between files stays cheap.
pub struct ModuleCache {
    inner: Mutex<CacheState>,
}

struct CacheState {
    modules: HashSet<String>,
    retained: HashSet<String>,
}

impl ModuleCache {
    pub fn new(retained: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            inner: Mutex::new(CacheState {
                modules: HashSet::new(),
                retained: retained.into_iter().map(Into::into).collect(),
            }),
        }
    }

    /// Records a specifier as evaluated. Returns `false` when it was already
    /// cached.
    pub fn insert(&self, specifier: impl Into<String>) -> bool {
        self.inner.lock().unwrap().modules.insert(specifier.into())
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.inner.lock().unwrap().modules.contains(specifier)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().modules.is_empty()
    }

    /// Primes the cache with every retained identity and returns how many
    /// there are. The result is the baseline size an isolation reset shrinks
    /// the cache back to.
    pub fn seed_retained(&self) -> usize {
        let mut state = self.inner.lock().unwrap();
        let CacheState { modules, retained } = &mut *state;
        for id in retained.iter() {
            modules.insert(id.clone());
        }
        retained.len()
    }

    /// Drops every cached specifier that is not retained. Returns the number
    /// of evicted entries.
    pub fn evict_user_modules(&self) -> usize {
        let mut state = self.inner.lock().unwrap();
        let before = state.modules.len();
        let CacheState { modules, retained } = &mut *state;
        modules.retain(|id| retained.contains(id));
        before - modules.len()
    }

    /// Cached specifiers in sorted order.
    pub fn specifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .inner
            .lock()
            .unwrap()
            .modules
            .iter()
            .cloned()
            .collect();
        out.sort();
        out
    }
}
