use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::PoolConfig;
use crate::pool::store::{BoundedCache, BoundedStore};
use crate::task::Task;

/// Caller-owned pool whose keys are namespaced by `prefix`
#[derive(Debug, Default)]
pub struct ScopedPool {
    pub prefix: String,
    pub tasks: HashMap<String, Task>,
}

impl ScopedPool {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            tasks: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Shared memoization pool for tasks.
///
/// Create one per process (or per subsystem) and pass it by reference; clones
/// share the same store. A fresh `TaskCache` is disabled: every lookup misses
/// and nothing is stored until [`TaskCache::initialize`] installs a store.
#[derive(Clone, Default)]
pub struct TaskCache {
    store: Arc<RwLock<Option<Arc<dyn BoundedCache<Task>>>>>,
    default_timeout: Option<Duration>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// An enabled pool holding at most `capacity` tasks
    pub fn with_capacity(capacity: usize) -> Self {
        let cache = Self::new();
        cache.initialize(capacity);
        cache
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        let mut cache = Self::new();
        if let Some(capacity) = config.capacity {
            cache.initialize(capacity);
        }
        cache.default_timeout = config.timeout_ms.map(Duration::from_millis);
        cache
    }

    /// Expiry applied when a lookup passes no timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Replace the store with a new one of `capacity`, discarding every
    /// previously cached task
    pub fn initialize(&self, capacity: usize) {
        self.initialize_with(Arc::new(BoundedStore::<Task>::new(capacity)));
    }

    /// Replace the store with `store`, discarding every previously cached
    /// task
    pub fn initialize_with(&self, store: Arc<dyn BoundedCache<Task>>) {
        let mut slot = self.store.write();
        if let Some(previous) = slot.take() {
            previous.reset();
        }
        debug!(capacity = store.capacity(), "task cache initialized");
        *slot = Some(store);
    }

    pub fn is_enabled(&self) -> bool {
        self.store.read().is_some()
    }

    /// Number of tasks currently cached
    pub fn len(&self) -> usize {
        self.store.read().as_ref().map_or(0, |store| store.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the live task cached under `key`, or build, stamp and cache a
    /// new one with `factory`.
    ///
    /// A cached task older than `timeout` counts as absent; its in-flight
    /// work, if any, is not interrupted.
    pub fn create_or_reuse<F>(&self, factory: F, key: impl Display, timeout: Option<Duration>) -> Task
    where
        F: FnOnce() -> Task,
    {
        self.resolve(None, factory, key.to_string(), timeout)
    }

    /// [`TaskCache::create_or_reuse`] through a caller-owned scoped pool.
    ///
    /// The effective key is `scope.prefix + key`. Both pools are consulted and
    /// a hit in this shared pool wins over a hit in `scope`. New tasks are
    /// stored in both.
    pub fn create_or_reuse_scoped<F>(
        &self,
        scope: &mut ScopedPool,
        factory: F,
        key: impl Display,
        timeout: Option<Duration>,
    ) -> Task
    where
        F: FnOnce() -> Task,
    {
        let key = format!("{}{}", scope.prefix, key);
        self.resolve(Some(scope), factory, key, timeout)
    }

    fn resolve<F>(
        &self,
        mut scope: Option<&mut ScopedPool>,
        factory: F,
        key: String,
        timeout: Option<Duration>,
    ) -> Task
    where
        F: FnOnce() -> Task,
    {
        let store = self.store.read().clone();
        let timeout = timeout.or(self.default_timeout);

        let scoped_hit = scope.as_deref().and_then(|scope| scope.get(&key).cloned());
        let shared_hit = store.as_ref().and_then(|store| store.get(&key));

        if let Some(task) = shared_hit.or(scoped_hit) {
            if is_live(&task, timeout) {
                debug!(key = %key, task = %task.id(), "reusing cached task");
                return task;
            }
            debug!(key = %key, task = %task.id(), "cached task expired");
        }

        let task = factory();
        if scope.is_none() && store.is_none() {
            return task;
        }

        task.stamp(key.clone(), Instant::now());
        debug!(key = %key, task = %task.id(), "caching new task");

        if let Some(scope) = scope.as_deref_mut() {
            scope.tasks.insert(key.clone(), task.clone());
        }
        if let Some(store) = store {
            store.set(key, task.clone());
        }

        task
    }
}

fn is_live(task: &Task, timeout: Option<Duration>) -> bool {
    match (timeout, task.cached_at()) {
        (Some(timeout), Some(at)) => at.elapsed() <= timeout,
        _ => true,
    }
}

impl std::fmt::Debug for TaskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCache")
            .field("enabled", &self.is_enabled())
            .field("len", &self.len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
