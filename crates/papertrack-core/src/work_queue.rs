//! Lock-free work queue for distributing papers across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free work queue distributing items to workers.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item
/// together with its position in the original sequence.
pub struct WorkQueue<S> {
    items: Vec<S>,
    cursor: AtomicUsize,
}

impl<S> WorkQueue<S> {
    pub fn new(items: Vec<S>) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim next item (lock-free)
    pub fn next(&self) -> Option<(usize, &S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|s| (i, s))
    }

    /// Items never claimed, e.g. after workers stopped early on shutdown
    pub fn unclaimed(&self) -> impl Iterator<Item = (usize, &S)> {
        let claimed = self.cursor.load(Ordering::Relaxed).min(self.items.len());
        self.items.iter().enumerate().skip(claimed)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }
}
