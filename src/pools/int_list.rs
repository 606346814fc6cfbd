use std::sync::Arc;

use parking_lot::Mutex;

use super::tree::{Handle, ListTree, EMPTY_HANDLE};

/// Deduplicates lists of integers, e.g. AS paths
#[derive(Debug)]
pub struct IntListPool {
    tree: Mutex<ListTree<u32, Arc<[u32]>>>,
    empty: Arc<[u32]>,
}

impl IntListPool {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(ListTree::new()),
            empty: Arc::from(Vec::new()),
        }
    }

    pub fn acquire(&self, list: &[u32]) -> Arc<[u32]> {
        self.acquire_with_handle(list).1
    }

    pub fn acquire_with_handle(&self, list: &[u32]) -> (Handle, Arc<[u32]>) {
        if list.is_empty() {
            return (EMPTY_HANDLE, self.empty.clone());
        }
        self.tree.lock().acquire(list, || Arc::from(list))
    }

    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IntListPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicates lists of strings, e.g. route type tags
#[derive(Debug)]
pub struct StringListPool {
    tree: Mutex<ListTree<String, Arc<[String]>>>,
    empty: Arc<[String]>,
}

impl StringListPool {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(ListTree::new()),
            empty: Arc::from(Vec::new()),
        }
    }

    pub fn acquire(&self, list: &[String]) -> Arc<[String]> {
        if list.is_empty() {
            return self.empty.clone();
        }
        self.tree.lock().acquire(list, || Arc::from(list)).1
    }

    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }
}

impl Default for StringListPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_int_list_identity() {
        let pool = IntListPool::new();
        let a = pool.acquire(&[2342, 23, 42]);
        let b = pool.acquire(&vec![2342, 23, 42]);
        let c = pool.acquire(&[2342, 23]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(Arc::ptr_eq(&pool.acquire(&[]), &pool.acquire(&[])));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_int_list_concurrent_callers() {
        let pool = Arc::new(IntListPool::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    // Different arrival orders of the same lists
                    let (first, second) = if i % 2 == 0 {
                        (vec![1, 2, 3], vec![3, 2, 1])
                    } else {
                        (vec![3, 2, 1], vec![1, 2, 3])
                    };
                    pool.acquire(&first);
                    pool.acquire(&second);
                    pool.acquire(&[1, 2, 3])
                })
            })
            .collect();
        let results: Vec<Arc<[u32]>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], result));
        }
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_string_list_identity() {
        let pool = StringListPool::new();
        let a = pool.acquire(&["BGP".to_string(), "unicast".to_string()]);
        let b = pool.acquire(&["BGP".to_string(), "unicast".to_string()]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }
}
