//! Worker threads: the scheduling loop.
//!
//! Each worker is an OS thread, optionally pinned to one logical CPU, that
//! repeatedly selects runnable work under the global lock, switches into
//! the chosen fiber with the lock released, and reconciles the outcome
//! under the lock again. Worker 0 is the thread that performed engine
//! startup; it runs this same loop directly instead of being spawned.

use crate::fiber::{Fiber, FiberState, JobBinding};
use crate::job_system::{Dispatch, Shared};
use crate::topology;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[cfg(feature = "trace")]
use crate::tracing::{CollectorGuard, TraceGuard};

/// Spawns a worker thread running the scheduling loop. Failure to create
/// the thread is fatal: the scheduler cannot run without its worker pool.
pub(crate) fn spawn(shared: Arc<Shared>, index: usize) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("fiber-worker-{index}"))
        .spawn(move || worker_loop(&shared, index))
        .expect("failed to spawn worker thread")
}

/// The scheduling loop. Runs until shutdown is requested.
///
/// Per iteration: pick work (resumable fibers first, then fresh jobs,
/// highest priority first), run it with the lock released, reconcile the
/// outcome. With nothing runnable the worker sleeps on the event condvar;
/// every enqueue, fiber return, and completion notifies it.
pub(crate) fn worker_loop(shared: &Arc<Shared>, index: usize) {
    topology::pin_current_thread(shared.config.pinning, index);

    #[cfg(feature = "trace")]
    let _collector = CollectorGuard;

    loop {
        let dispatch = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(dispatch) = state.take_work() {
                    break dispatch;
                }
                state = shared.events.wait(state).unwrap();
            }
        };

        let (fiber, outcome) = execute(dispatch, shared, index);
        reconcile(shared, fiber, outcome);
    }
}

/// Switches into the selected fiber. Runs without the scheduler lock;
/// control returns when the job finishes or parks on a counter.
fn execute(dispatch: Dispatch, shared: &Arc<Shared>, worker_index: usize) -> (Box<Fiber>, FiberState) {
    let _ = worker_index;
    match dispatch {
        Dispatch::Fresh {
            mut fiber,
            job,
            priority,
            counter,
        } => {
            #[cfg(feature = "trace")]
            let _span = TraceGuard::new("job_run", worker_index);
            fiber.bind(JobBinding { priority, counter });
            let outcome = fiber.run(job, Arc::clone(shared));
            (fiber, outcome)
        }
        Dispatch::Resumed(mut fiber) => {
            #[cfg(feature = "trace")]
            let _span = TraceGuard::new("job_resume", worker_index);
            let outcome = fiber.resume_waiting();
            (fiber, outcome)
        }
    }
}

/// Post-run bookkeeping, under the global lock.
///
/// A finished fiber goes back to the idle pool and its counter, if any, is
/// decremented here — the single point where a job's completion becomes
/// visible to waiters. A suspended fiber is parked on its awaited counter,
/// unless that counter already hit zero, in which case it goes straight to
/// the resumable queue so a completion landing between the job's wait call
/// and this reconcile is never missed.
fn reconcile(shared: &Arc<Shared>, mut fiber: Box<Fiber>, outcome: FiberState) {
    let mut state = shared.state.lock().unwrap();
    match outcome {
        FiberState::Finished => {
            let binding = fiber.take_binding();
            state.fibers.release(fiber);
            if let Some(id) = binding.counter {
                state.complete_one(id);
            }
            #[cfg(feature = "metrics")]
            shared.metrics.record_completed();
            drop(state);
            shared.events.notify_all();
        }
        FiberState::Waiting(id) => {
            #[cfg(feature = "metrics")]
            shared.metrics.record_parked();
            if state.counters.slot(id).is_finished() {
                state.make_resumable(fiber);
                drop(state);
                shared.events.notify_all();
            } else {
                state.counters.slot_mut(id).park(fiber);
            }
        }
    }
}
