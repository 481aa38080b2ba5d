use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Size-bounded key/value store backing a task pool
pub trait BoundedCache<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    fn set(&self, key: String, value: V);

    /// Discard every entry
    fn reset(&self);

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`BoundedCache`] evicting the oldest inserted key once over capacity
pub struct BoundedStore<V> {
    capacity: usize,
    entries: DashMap<String, V>,
    order: Mutex<VecDeque<String>>,
}

impl<V> BoundedStore<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::with_capacity(capacity),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }
}

impl<V> BoundedCache<V> for BoundedStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut order = self.order.lock();
        if self.entries.insert(key.clone(), value).is_some() {
            order.retain(|existing| existing != &key);
        }
        order.push_back(key);

        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn reset(&self) {
        let mut order = self.order.lock();
        order.clear();
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
