use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use perch_core::GeneratorSettings;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{GeneratorError, GeneratorLoader, GeneratorRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of loaded instances
    pub capacity: usize,
    /// Minimum time between edit-time checks for one generator
    pub staleness_check_interval: Duration,
}

impl CacheOptions {
    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        Self {
            capacity: settings.cache_capacity.max(1),
            staleness_check_interval: settings.staleness_check_interval(),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: 100,
            staleness_check_interval: Duration::from_secs(3),
        }
    }
}

struct CacheEntry {
    runtime: Arc<dyn GeneratorRuntime>,
    /// Epoch milliseconds when loading finished
    loaded_at: i64,
    last_used: Instant,
    /// Tie-breaker for entries used within the same instant
    use_order: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    last_checked: HashMap<String, Instant>,
    next_use: u64,
}

impl CacheState {
    fn touch(&mut self, name: &str) -> Option<Arc<dyn GeneratorRuntime>> {
        let order = self.next_use;
        let entry = self.entries.get_mut(name)?;
        entry.last_used = Instant::now();
        entry.use_order = order;
        self.next_use += 1;
        Some(entry.runtime.clone())
    }

    /// Remove least-recently-used entries until within `capacity`.
    fn evict_over(&mut self, capacity: usize, keep: Option<&str>) -> Vec<(String, CacheEntry)> {
        let mut evicted = Vec::new();
        while self.entries.len() > capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(name, _)| Some(name.as_str()) != keep)
                .min_by_key(|(_, entry)| (entry.last_used, entry.use_order))
                .map(|(name, _)| name.clone());
            let Some(victim) = victim else { break };
            if let Some(entry) = self.entries.remove(&victim) {
                self.last_checked.remove(&victim);
                evicted.push((victim, entry));
            }
        }
        evicted
    }
}

/// Bounded map of loaded generator instances.
///
/// Loads of the same name are serialised so concurrent commands share one
/// instance. Instances leaving the cache are always closed.
pub struct GeneratorCache {
    loader: GeneratorLoader,
    options: CacheOptions,
    state: Mutex<CacheState>,
    load_guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GeneratorCache {
    pub fn new(loader: GeneratorLoader, options: CacheOptions) -> Self {
        Self {
            loader,
            options,
            state: Mutex::new(CacheState::default()),
            load_guards: Mutex::new(HashMap::new()),
        }
    }

    /// Cached instance for `name`, loading it if absent or outdated.
    pub async fn get_or_load(
        &self,
        name: &str,
    ) -> Result<Arc<dyn GeneratorRuntime>, GeneratorError> {
        let guard = self
            .load_guards
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();

        let result = {
            let _loading = guard.lock().await;
            self.get_or_load_exclusive(name).await
        };

        let mut guards = self.load_guards.lock().await;
        // Only the map and this call hold the guard: nobody else is waiting.
        if Arc::strong_count(&guard) <= 2 {
            guards.remove(name);
        }
        result
    }

    async fn get_or_load_exclusive(
        &self,
        name: &str,
    ) -> Result<Arc<dyn GeneratorRuntime>, GeneratorError> {
        self.drop_if_outdated(name).await;

        if let Some(runtime) = self.state.lock().await.touch(name) {
            debug!(generator = name, "Generator cache hit");
            return Ok(runtime);
        }

        let runtime = self.loader.load(name).await?;
        let evicted = {
            let mut state = self.state.lock().await;
            let use_order = state.next_use;
            state.next_use += 1;
            state.entries.insert(
                name.to_string(),
                CacheEntry {
                    runtime: runtime.clone(),
                    loaded_at: chrono::Utc::now().timestamp_millis(),
                    last_used: Instant::now(),
                    use_order,
                },
            );
            state.evict_over(self.options.capacity, Some(name))
        };
        close_all(evicted, "capacity").await;

        Ok(runtime)
    }

    /// Ask the catalog whether the cached copy predates the last edit.
    ///
    /// Checks happen at most once per interval per name. A failed check keeps
    /// the cached copy.
    async fn drop_if_outdated(&self, name: &str) {
        let due = {
            let mut state = self.state.lock().await;
            if !state.entries.contains_key(name) {
                return;
            }
            let now = Instant::now();
            let checked_recently = state
                .last_checked
                .get(name)
                .is_some_and(|checked| now.duration_since(*checked) < self.options.staleness_check_interval);
            if !checked_recently {
                state.last_checked.insert(name.to_string(), now);
            }
            !checked_recently
        };
        if !due {
            return;
        }

        let edited_at = match self.loader.catalog().last_edit_time(name).await {
            Ok(edited_at) => edited_at,
            Err(err) => {
                warn!(generator = name, error = %err, "Edit-time check failed; keeping cached copy");
                return;
            }
        };

        let outdated = {
            let mut state = self.state.lock().await;
            let edited = state
                .entries
                .get(name)
                .is_some_and(|entry| entry.loaded_at < edited_at);
            if edited { state.entries.remove(name) } else { None }
        };
        if let Some(entry) = outdated {
            info!(generator = name, "Generator was edited; reloading");
            entry.runtime.close().await;
        }
    }

    /// Drop `name` from the cache. Returns whether it was cached.
    pub async fn invalidate(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            state.last_checked.remove(name);
            state.entries.remove(name)
        };
        match removed {
            Some(entry) => {
                info!(generator = name, "Generator removed from cache");
                entry.runtime.close().await;
                true
            }
            None => false,
        }
    }

    /// Evict least-recently-used instances while over capacity.
    pub async fn evict_lru_if_over_capacity(&self) {
        let evicted = self
            .state
            .lock()
            .await
            .evict_over(self.options.capacity, None);
        close_all(evicted, "capacity").await;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.lock().await.entries.contains_key(name)
    }

    /// Close every instance.
    pub async fn clear(&self) {
        let drained: Vec<_> = {
            let mut state = self.state.lock().await;
            state.last_checked.clear();
            state.entries.drain().collect()
        };
        close_all(drained, "shutdown").await;
    }
}

async fn close_all(entries: Vec<(String, CacheEntry)>, reason: &str) {
    for (name, entry) in entries {
        info!(generator = %name, reason, "Closing generator instance");
        entry.runtime.close().await;
    }
}
