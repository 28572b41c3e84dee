//! FIFO work queue with a single-drainer flag
//!
//! Any number of producers push items; whoever wins [`WorkQueue::try_begin_drain`]
//! becomes the only consumer until its [`DrainGuard`] is dropped. Callers
//! that lose the race return immediately, the active drainer picks their
//! items up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    draining: AtomicBool,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        // push/pop cannot leave the deque half-updated
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the back
    pub fn push(&self, item: T) {
        self.items().push_back(item);
    }

    /// Take from the front
    pub fn pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Whether a drain currently holds the queue
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Claim the drain flag; `None` when another drain holds it
    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_, T>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { queue: self })
    }
}

/// Releases the drain flag on drop
#[derive(Debug)]
pub struct DrainGuard<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.draining.store(false, Ordering::Release);
    }
}
