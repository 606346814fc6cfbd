use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

#[derive(Debug)]
struct StringPoolInner {
    // value -> (canonical instance, generation of last acquire)
    values: HashMap<Arc<str>, (Arc<str>, u64)>,
    generation: u64,
}

/// Deduplicates strings; values not acquired between two
/// garbage collections are released by the second one.
#[derive(Debug)]
pub struct StringPool {
    inner: Mutex<StringPoolInner>,
    empty: Arc<str>,
}

impl StringPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StringPoolInner {
                values: HashMap::with_capacity(64),
                generation: 0,
            }),
            empty: Arc::from(""),
        }
    }

    pub fn acquire(&self, value: &str) -> Arc<str> {
        if value.is_empty() {
            return self.empty.clone();
        }
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        if let Some(entry) = inner.values.get_mut(value) {
            entry.1 = generation;
            return entry.0.clone();
        }
        let canonical: Arc<str> = Arc::from(value);
        inner
            .values
            .insert(canonical.clone(), (canonical.clone(), generation));
        canonical
    }

    /// Release every value that was not acquired since the previous
    /// call and start a new generation. Returns the released count.
    pub fn garbage_collect(&self) -> usize {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        let before = inner.values.len();
        inner.values.retain(|_, (_, seen)| *seen >= generation);
        inner.generation += 1;
        let released = before - inner.values.len();
        trace!("Released {} pooled strings", released);
        released
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_same_instance() {
        let pool = StringPool::new();
        let a = pool.acquire("192.0.2.1");
        let b = pool.acquire(&String::from("192.0.2.1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
        assert!(Arc::ptr_eq(&pool.acquire(""), &pool.acquire("")));
    }

    #[test]
    fn test_garbage_collect_generations() {
        let pool = StringPool::new();
        pool.acquire("eth0");
        pool.acquire("eth1");
        // Both were acquired in the current generation
        assert_eq!(pool.garbage_collect(), 0);

        pool.acquire("eth0");
        // eth1 was not acquired since the last run
        assert_eq!(pool.garbage_collect(), 1);
        assert_eq!(pool.len(), 1);

        assert_eq!(pool.garbage_collect(), 1);
        assert!(pool.is_empty());
    }
}
