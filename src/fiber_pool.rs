//! The idle fiber pool: a fixed set of pre-allocated fibers shared by all
//! worker threads, guarded by the global scheduler lock.
//!
//! The pool never grows. When it runs dry, queued jobs simply stay queued
//! until a running job finishes and returns its fiber; stalling is the
//! designed response to exhaustion, not an error.

use crate::fiber::Fiber;

pub(crate) struct FiberPool {
    idle: Vec<Box<Fiber>>,
    capacity: usize,
}

impl FiberPool {
    /// Pre-allocates `count` fibers, each with its own `stack_size` stack.
    pub(crate) fn new(count: usize, stack_size: usize) -> Self {
        let mut idle = Vec::with_capacity(count);
        for _ in 0..count {
            idle.push(Box::new(Fiber::new(stack_size)));
        }
        FiberPool {
            idle,
            capacity: count,
        }
    }

    /// Claims an idle fiber, or `None` if every fiber is running or parked.
    pub(crate) fn acquire(&mut self) -> Option<Box<Fiber>> {
        self.idle.pop()
    }

    /// Returns a fiber whose job has run to completion.
    pub(crate) fn release(&mut self, fiber: Box<Fiber>) {
        debug_assert!(self.idle.len() < self.capacity);
        self.idle.push(fiber);
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when every fiber is back in the pool, i.e. nothing is running
    /// or parked anywhere in the scheduler.
    pub(crate) fn all_idle(&self) -> bool {
        self.idle.len() == self.capacity
    }
}
