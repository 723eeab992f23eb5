//! Concurrency slots shared by every mapping call on one executor
//!
//! A slot is a semaphore permit taken before a task starts and handed back
//! when the task's future is dropped, whether it completed, failed or was
//! cancelled. Each running task is scoped with the pool it belongs to, so a
//! mapping call can tell when it is being driven from inside one of its own
//! executor's tasks.

use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::PollSemaphore;

tokio::task_local! {
    /// Identity of the pool whose task is currently being polled
    static RUNNING_IN: usize;
}

/// Fixed-size pool of concurrency tokens
#[derive(Debug, Clone)]
pub struct SlotPool {
    /// Total slots in pool
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl SlotPool {
    /// Create a pool with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Take a slot if one is free
    pub fn try_acquire(&self) -> Option<Slot> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(Slot { _permit: permit })
    }

    /// Handle for acquiring slots from a poll function
    pub fn waiter(&self) -> SlotWaiter {
        SlotWaiter {
            semaphore: PollSemaphore::new(Arc::clone(&self.semaphore)),
        }
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.semaphore) as usize
    }

    /// Run `task` marked as belonging to this pool
    pub(crate) fn scope<F: Future>(&self, task: F) -> impl Future<Output = F::Output> {
        RUNNING_IN.scope(self.id(), task)
    }

    /// Whether the caller is being polled from inside a task of this pool
    pub(crate) fn is_current(&self) -> bool {
        RUNNING_IN.try_with(|id| *id == self.id()).unwrap_or(false)
    }
}

/// Queued slot acquisition for one mapping call
pub struct SlotWaiter {
    semaphore: PollSemaphore,
}

impl std::fmt::Debug for SlotWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotWaiter")
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

impl SlotWaiter {
    /// Take a slot, or register `cx` to be woken when one is handed over
    pub fn poll_acquire(&mut self, cx: &mut Context<'_>) -> Poll<Slot> {
        match self.semaphore.poll_acquire(cx) {
            Poll::Ready(Some(permit)) => Poll::Ready(Slot { _permit: permit }),
            // The pool never closes its semaphore
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

/// A held slot; released on drop
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}
