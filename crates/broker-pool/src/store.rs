//! Idle connection store.

/// Bounded LIFO stack of idle connections.
///
/// The most recently released connection is handed out first, so warm
/// connections are reused and cold ones age out.
pub(crate) struct IdleStore<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> IdleStore<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity,
        }
    }

    /// Pop the most recently released item.
    pub(crate) fn try_take(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Push an item, handing it back if the store is full.
    pub(crate) fn put(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push(item);
        Ok(())
    }

    /// Remove every item.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut store = IdleStore::new(3);
        store.put(1).unwrap();
        store.put(2).unwrap();
        store.put(3).unwrap();

        assert_eq!(store.try_take(), Some(3));
        assert_eq!(store.try_take(), Some(2));
        assert_eq!(store.try_take(), Some(1));
        assert_eq!(store.try_take(), None);
    }

    #[test]
    fn test_put_rejects_when_full() {
        let mut store = IdleStore::new(1);
        store.put("a").unwrap();
        assert!(store.is_full());
        assert_eq!(store.put("b"), Err("b"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_zero_capacity() {
        let mut store = IdleStore::new(0);
        assert_eq!(store.put(1), Err(1));
        assert!(store.is_full());
    }

    #[test]
    fn test_drain() {
        let mut store = IdleStore::new(4);
        store.put(1).unwrap();
        store.put(2).unwrap();

        assert_eq!(store.drain(), vec![1, 2]);
        assert_eq!(store.len(), 0);
        assert_eq!(store.try_take(), None);
    }
}
