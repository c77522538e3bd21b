// src/accumulator.rs
use std::sync::Arc;
use parking_lot::Mutex;

/// An ordered growable sequence shared by concurrent workers.
///
/// A single mutual-exclusion lock guards every read-modify-append, so there
/// are no lost updates and no torn appends; element order reflects lock
/// acquisition order, which varies across runs but is internally consistent.
/// The guard is scoped, so the lock is released even if an append unwinds.
///
/// Cloning is cheap and shares the underlying sequence.
#[derive(Debug)]
pub struct SharedAccumulator<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for SharedAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SharedAccumulator<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> SharedAccumulator<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends one item under the lock. Safe from any number of workers.
    pub fn append(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Appends a group of items inside one critical section, so items from
    /// different workers never interleave within the group.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let mut guard = self.items.lock();
        guard.extend(items);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copies the current contents out from under the lock.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.lock().clone()
    }

    /// Consumes the handle; returns the accumulated items if this was the
    /// last handle, or a snapshot otherwise.
    pub fn into_items(self) -> Vec<T>
    where
        T: Clone,
    {
        match Arc::try_unwrap(self.items) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn append_preserves_every_item() {
        let acc = SharedAccumulator::new();
        for i in 0..10 {
            acc.append(i);
        }
        assert_eq!(acc.len(), 10);
        assert_eq!(acc.snapshot(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        const WORKERS: usize = 100;
        const ITEMS_PER_WORKER: usize = 1000;

        let acc = SharedAccumulator::new();
        let handles: Vec<_> = (0..WORKERS)
            .map(|w| {
                let acc = acc.clone();
                std::thread::spawn(move || {
                    for k in 0..ITEMS_PER_WORKER {
                        acc.append(w * ITEMS_PER_WORKER + k);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let items = acc.into_items();
        assert_eq!(items.len(), WORKERS * ITEMS_PER_WORKER);

        // No duplicates and no gaps, regardless of interleaving.
        let unique: HashSet<_> = items.iter().copied().collect();
        assert_eq!(unique.len(), WORKERS * ITEMS_PER_WORKER);
    }

    #[test]
    fn extend_keeps_groups_contiguous() {
        let acc = SharedAccumulator::new();
        let handles: Vec<_> = (0..8)
            .map(|w| {
                let acc = acc.clone();
                std::thread::spawn(move || {
                    acc.extend((0..5).map(move |k| (w, k)));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let items = acc.into_items();
        assert_eq!(items.len(), 40);
        // Each worker's group of five occupies a contiguous run.
        for chunk in items.chunks(5) {
            assert!(chunk.iter().all(|&(w, _)| w == chunk[0].0));
            assert_eq!(
                chunk.iter().map(|&(_, k)| k).collect::<Vec<_>>(),
                vec![0, 1, 2, 3, 4]
            );
        }
    }
}
