//! Job counters: countdown synchronization for batches of jobs.
//!
//! A counter is created per submitted batch and tracks how many of its jobs
//! remain unfinished. Fibers block on a counter with [`JobCounter::wait`],
//! which parks the fiber rather than the worker thread. When the last job
//! of the batch completes, every parked fiber moves to the resumable queue
//! of its original priority.
//!
//! Counter storage is a pool of slots owned by the scheduler; all slot
//! mutation happens under the single global scheduler lock. The public
//! [`JobCounter`] handle is what batch submitters hold; the caller releases
//! it back to the pool once it has observed completion.

use crate::fiber::{self, Fiber, FiberYield};
use crate::job_system::Shared;
use crossbeam::utils::Backoff;
use std::sync::Arc;

/// Index of a counter slot in the scheduler's pool. Jobs carry this instead
/// of a pointer so a recycled slot can never be dereferenced stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterId(usize);

/// Pool slot state for one in-flight batch.
pub(crate) struct CounterSlot {
    /// Batch size this counter was (re)initialized with.
    total: usize,
    /// Jobs of the current batch not yet run to completion.
    remaining: usize,
    /// Fibers parked on this counter, each still bound to its job.
    waiters: Vec<Box<Fiber>>,
    in_use: bool,
}

impl CounterSlot {
    fn vacant() -> Self {
        CounterSlot {
            total: 0,
            remaining: 0,
            waiters: Vec::new(),
            in_use: false,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Records one job completion. Underflow means a job completed that was
    /// never accounted to this batch; that is unrecoverable corruption.
    pub(crate) fn finish_one(&mut self) {
        self.remaining = self
            .remaining
            .checked_sub(1)
            .expect("job counter underflow: more completions than submitted jobs");
    }

    /// Parks a suspended fiber until the batch finishes.
    pub(crate) fn park(&mut self, fiber: Box<Fiber>) {
        debug_assert!(self.remaining > 0);
        self.waiters.push(fiber);
    }

    /// Takes every parked fiber for transfer to the resumable queues.
    pub(crate) fn take_waiters(&mut self) -> Vec<Box<Fiber>> {
        std::mem::take(&mut self.waiters)
    }

    pub(crate) fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }
}

/// Slot arena plus free list. Pre-sized at startup; grows from the global
/// heap if a frame submits more concurrent batches than the pool holds,
/// because submission must never block.
pub(crate) struct CounterPool {
    slots: Vec<CounterSlot>,
    free: Vec<CounterId>,
}

impl CounterPool {
    pub(crate) fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(CounterSlot::vacant());
            free.push(CounterId(i));
        }
        CounterPool { slots, free }
    }

    /// Claims a slot and initializes it for a batch of `batch_size` jobs.
    pub(crate) fn acquire(&mut self, batch_size: usize) -> CounterId {
        let id = self.free.pop().unwrap_or_else(|| {
            self.slots.push(CounterSlot::vacant());
            CounterId(self.slots.len() - 1)
        });
        let slot = &mut self.slots[id.0];
        debug_assert!(!slot.in_use);
        slot.total = batch_size;
        slot.remaining = batch_size;
        slot.in_use = true;
        id
    }

    /// Returns a finished, waiter-free slot to the pool.
    pub(crate) fn release(&mut self, id: CounterId) {
        let slot = &mut self.slots[id.0];
        assert!(slot.in_use, "released a job counter twice");
        assert!(
            slot.is_finished(),
            "released a job counter with {} unfinished jobs",
            slot.remaining
        );
        assert!(
            !slot.has_waiters(),
            "released a job counter with parked waiters"
        );
        *slot = CounterSlot::vacant();
        self.free.push(id);
    }

    /// Restores `remaining = total` so the same slot can track a repeated
    /// identical batch. Legal only between batches.
    pub(crate) fn reset(&mut self, id: CounterId) {
        let slot = &mut self.slots[id.0];
        assert!(slot.in_use, "reset a released job counter");
        assert!(
            slot.is_finished() && !slot.has_waiters(),
            "reset a job counter with its batch still in flight"
        );
        slot.remaining = slot.total;
    }

    pub(crate) fn slot(&self, id: CounterId) -> &CounterSlot {
        let slot = &self.slots[id.0];
        debug_assert!(slot.in_use, "accessed a released job counter");
        slot
    }

    pub(crate) fn slot_mut(&mut self, id: CounterId) -> &mut CounterSlot {
        let slot = &mut self.slots[id.0];
        debug_assert!(slot.in_use, "accessed a released job counter");
        slot
    }
}

/// Handle to one batch's counter.
///
/// Obtained from the counter-returning submission calls. The holder may
/// `wait` on it (from a job fiber or an external thread), `reset` it to
/// reuse the slot for a repeated batch, and must eventually `release` it
/// once the batch has been observed finished. Dropping an unfinished
/// handle leaks the slot and logs; it does not cancel anything.
pub struct JobCounter {
    shared: Arc<Shared>,
    id: CounterId,
    released: bool,
}

impl JobCounter {
    pub(crate) fn new(shared: Arc<Shared>, id: CounterId) -> Self {
        JobCounter {
            shared,
            id,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> CounterId {
        self.id
    }

    /// Blocks until every job of the batch has run to completion.
    ///
    /// Called from inside a job, this parks the calling fiber and switches
    /// back to the worker's home context, so the worker keeps running other
    /// jobs in the meantime; execution resumes here once the counter hits
    /// zero. Called from a thread outside the scheduler, it blocks the
    /// thread with a short adaptive spin followed by a condvar sleep.
    pub fn wait(&self) {
        if fiber::current().is_some() {
            {
                let state = self.shared.state.lock().unwrap();
                if state.counters.slot(self.id).is_finished() {
                    return;
                }
            }
            // The lock is dropped before switching; the worker re-checks
            // the counter under the lock when it parks us, so a completion
            // landing in this window still resumes the fiber.
            fiber::suspend_current(FiberYield::Wait(self.id));
            // Resumed only after the batch finished.
        } else {
            let backoff = Backoff::new();
            while !backoff.is_completed() {
                if self.is_finished() {
                    return;
                }
                backoff.snooze();
            }
            let mut state = self.shared.state.lock().unwrap();
            while !state.counters.slot(self.id).is_finished() {
                state = self.shared.events.wait(state).unwrap();
            }
        }
    }

    /// True once every job of the current batch has finished.
    pub fn is_finished(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state.counters.slot(self.id).is_finished()
    }

    /// Reinitializes the counter for a repeated identical batch. Legal only
    /// once the previous batch has fully completed.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.counters.reset(self.id);
    }

    /// Returns the counter slot to the pool. Legal only once the batch has
    /// finished and no fiber is parked on it; anything else is a fatal
    /// usage error.
    pub fn release(mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.counters.release(self.id);
        drop(state);
        self.released = true;
    }
}

impl Drop for JobCounter {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut state = self.shared.state.lock().unwrap();
        let slot = state.counters.slot(self.id);
        let (finished, waiters, remaining) =
            (slot.is_finished(), slot.has_waiters(), slot.remaining());
        if finished && !waiters {
            state.counters.release(self.id);
        } else {
            // A dropped handle cannot cancel in-flight jobs; the slot stays
            // live so completions still have somewhere to land.
            eprintln!(
                "[fibersched] job counter dropped with {remaining} unfinished jobs; slot leaked"
            );
        }
    }
}
