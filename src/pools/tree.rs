use std::collections::HashMap;
use std::hash::Hash;

/// Handle of a canonical value; assigned once, at first insertion.
/// 0 is reserved for the canonical empty value of a pool.
pub type Handle = u64;

pub(super) const EMPTY_HANDLE: Handle = 0;

#[derive(Debug)]
struct Entry<V> {
    handle: Handle,
    value: V,
}

#[derive(Debug)]
struct Node<K, V> {
    children: HashMap<K, Node<K, V>>,
    // Set exactly once; a node holding an entry is final for its key sequence
    entry: Option<Entry<V>>,
}

impl<K, V> Node<K, V> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            entry: None,
        }
    }
}

/// Prefix tree keyed by the elements of a list
#[derive(Debug)]
pub(super) struct ListTree<K, V> {
    root: Node<K, V>,
    next_handle: Handle,
    len: usize,
}

impl<K, V> ListTree<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(super) fn new() -> Self {
        Self {
            root: Node::new(),
            next_handle: EMPTY_HANDLE + 1,
            len: 0,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Return the stored value for `key`, calling `make` only at the first occurrence
    pub(super) fn acquire<F>(&mut self, key: &[K], make: F) -> (Handle, V)
    where
        F: FnOnce() -> V,
    {
        let mut node = &mut self.root;
        for k in key {
            node = node.children.entry(k.clone()).or_insert_with(Node::new);
        }
        if let Some(entry) = &node.entry {
            return (entry.handle, entry.value.clone());
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.len += 1;
        let value = make();
        node.entry = Some(Entry {
            handle,
            value: value.clone(),
        });
        (handle, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_once() {
        let mut tree: ListTree<u32, Arc<[u32]>> = ListTree::new();
        let (h1, v1) = tree.acquire(&[1, 2, 3], || Arc::from(vec![1, 2, 3]));
        let (h2, v2) = tree.acquire(&[1, 2, 3], || panic!("should not rebuild"));
        assert_eq!(h1, h2);
        assert!(Arc::ptr_eq(&v1, &v2));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_prefix_is_distinct() {
        let mut tree: ListTree<u32, Arc<[u32]>> = ListTree::new();
        let (h1, _) = tree.acquire(&[1, 2, 3], || Arc::from(vec![1, 2, 3]));
        let (h2, short) = tree.acquire(&[1, 2], || Arc::from(vec![1, 2]));
        assert_ne!(h1, h2);
        assert_eq!(&short[..], &[1, 2]);
        assert_eq!(tree.len(), 2);
    }
}
