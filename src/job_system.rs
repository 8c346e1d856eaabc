//! The job system: composition root owning the scheduler state.
//!
//! All shared collections — the per-priority job queues, the per-priority
//! resumable queues, the idle fiber pool, and the counter pool — live
//! behind one global mutex. The lock is deliberately coarse: it is held
//! only for the short bookkeeping windows around dispatch and reconcile,
//! never across a job body or a context switch, and a single lock avoids
//! ordering hazards between a counter and the queues it feeds.

use crate::counter::{CounterId, CounterPool, JobCounter};
use crate::fiber::Fiber;
use crate::fiber_pool::FiberPool;
use crate::job::{JOB_PRIORITY_COUNT, Job, JobPriority, QueuedJob};
use crate::worker;
use crate::{PinningStrategy, topology};

#[cfg(feature = "metrics")]
use crate::metrics::Metrics;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Scheduler sizing and placement knobs.
///
/// The defaults mirror the engine's tuning: a 160-fiber pool, 512 KiB
/// stacks, and queues pre-reserved for 100 jobs per priority level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSystemConfig {
    /// Worker thread count; 0 means one per logical CPU.
    pub worker_threads: usize,
    /// Fibers pre-allocated at startup. The pool never grows; queued jobs
    /// stall when every fiber is busy or parked.
    pub fiber_pool_size: usize,
    /// Stack bytes per fiber.
    pub stack_size: usize,
    /// Counter slots pre-allocated at startup.
    pub counter_pool_size: usize,
    /// Entries pre-reserved per priority queue.
    pub queue_capacity: usize,
    /// How worker threads are pinned to CPU cores.
    pub pinning: PinningStrategy,
}

impl Default for JobSystemConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            fiber_pool_size: 160,
            stack_size: 512 * 1024,
            counter_pool_size: 128,
            queue_capacity: 100,
            pinning: PinningStrategy::None,
        }
    }
}

impl JobSystemConfig {
    /// The configuration engine startup uses: one pinned worker per
    /// logical CPU.
    pub fn engine() -> Self {
        Self {
            pinning: PinningStrategy::Linear,
            ..Self::default()
        }
    }
}

/// Everything the global lock guards.
pub(crate) struct SchedulerState {
    job_queues: [VecDeque<QueuedJob>; JOB_PRIORITY_COUNT],
    resumable: [VecDeque<Box<Fiber>>; JOB_PRIORITY_COUNT],
    pub(crate) fibers: FiberPool,
    pub(crate) counters: CounterPool,
    pub(crate) shutdown: bool,
}

/// Work selected for a worker to run, chosen under the lock.
pub(crate) enum Dispatch {
    /// A parked fiber whose dependency was satisfied; already bound.
    Resumed(Box<Fiber>),
    /// A fresh job paired with an idle fiber.
    Fresh {
        fiber: Box<Fiber>,
        job: Job,
        priority: JobPriority,
        counter: Option<CounterId>,
    },
}

impl SchedulerState {
    fn new(config: &JobSystemConfig) -> Self {
        SchedulerState {
            job_queues: std::array::from_fn(|_| VecDeque::with_capacity(config.queue_capacity)),
            resumable: std::array::from_fn(|_| VecDeque::with_capacity(config.queue_capacity)),
            fibers: FiberPool::new(config.fiber_pool_size, config.stack_size),
            counters: CounterPool::new(config.counter_pool_size),
            shutdown: false,
        }
    }

    /// Selects the next runnable work item, highest priority first. Within
    /// a priority level a resumable fiber beats a fresh job, and a fresh
    /// job starts only if an idle fiber is available; when the pool is
    /// exhausted, lower-priority resumable fibers are still considered.
    pub(crate) fn take_work(&mut self) -> Option<Dispatch> {
        for priority in JobPriority::ALL {
            let i = priority.index();
            if let Some(fiber) = self.resumable[i].pop_front() {
                return Some(Dispatch::Resumed(fiber));
            }
            if !self.job_queues[i].is_empty() && self.fibers.idle_count() > 0 {
                let queued = self.job_queues[i]
                    .pop_front()
                    .expect("non-empty job queue had no front entry");
                let fiber = self
                    .fibers
                    .acquire()
                    .expect("idle fiber vanished while the scheduler lock was held");
                return Some(Dispatch::Fresh {
                    fiber,
                    job: queued.job,
                    priority,
                    counter: queued.counter,
                });
            }
        }
        None
    }

    /// Records one completion against `id` and, if that finished the
    /// batch, moves every parked fiber to the resumable queue matching its
    /// own priority.
    pub(crate) fn complete_one(&mut self, id: CounterId) {
        let slot = self.counters.slot_mut(id);
        slot.finish_one();
        if slot.is_finished() {
            for fiber in slot.take_waiters() {
                let i = fiber.binding_priority().index();
                self.resumable[i].push_back(fiber);
            }
        }
    }

    /// Re-queues a fiber whose awaited counter is already satisfied.
    pub(crate) fn make_resumable(&mut self, fiber: Box<Fiber>) {
        let i = fiber.binding_priority().index();
        self.resumable[i].push_back(fiber);
    }

    /// True when no work is queued, parked, or running anywhere.
    fn is_quiescent(&self) -> bool {
        self.job_queues.iter().all(VecDeque::is_empty)
            && self.resumable.iter().all(VecDeque::is_empty)
            && self.fibers.all_idle()
    }
}

/// State shared between the public handle, every worker thread, and every
/// counter handle.
pub(crate) struct Shared {
    pub(crate) state: Mutex<SchedulerState>,
    /// Signaled on every enqueue, resume-eligible event, fiber return,
    /// counter completion, and shutdown request. Workers and external
    /// waiters sleep on it; priority order is preserved because each woken
    /// worker re-scans all queues under the lock.
    pub(crate) events: Condvar,
    pub(crate) config: JobSystemConfig,
    pub(crate) worker_count: usize,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Metrics,
}

impl Shared {
    pub(crate) fn build(config: JobSystemConfig) -> Arc<Shared> {
        let worker_count = if config.worker_threads == 0 {
            topology::worker_thread_count()
        } else {
            config.worker_threads
        };
        Arc::new(Shared {
            state: Mutex::new(SchedulerState::new(&config)),
            events: Condvar::new(),
            config,
            worker_count,
            #[cfg(feature = "metrics")]
            metrics: Metrics::new(),
        })
    }

    /// Appends a batch to the priority's job queue and wakes workers.
    /// Never blocks the caller.
    pub(crate) fn submit(&self, jobs: Vec<Job>, priority: JobPriority, counter: Option<CounterId>) {
        #[cfg(feature = "metrics")]
        self.metrics.record_submitted(jobs.len() as u64);

        let mut state = self.state.lock().unwrap();
        for job in jobs {
            state.job_queues[priority.index()].push_back(QueuedJob { job, counter });
        }
        drop(state);
        self.events.notify_all();
    }

    /// Acquires a pool counter sized to the batch, then submits.
    pub(crate) fn submit_with_new_counter(
        self: &Arc<Self>,
        jobs: Vec<Job>,
        priority: JobPriority,
    ) -> JobCounter {
        #[cfg(feature = "metrics")]
        self.metrics.record_submitted(jobs.len() as u64);
        #[cfg(feature = "metrics")]
        self.metrics.record_counter_acquired();

        let id = {
            let mut state = self.state.lock().unwrap();
            let id = state.counters.acquire(jobs.len());
            for job in jobs {
                state.job_queues[priority.index()].push_back(QueuedJob {
                    job,
                    counter: Some(id),
                });
            }
            id
        };
        self.events.notify_all();
        JobCounter::new(Arc::clone(self), id)
    }

    /// Resubmits a batch against a counter previously reset by its holder.
    /// The batch size must match what the counter was reset to.
    pub(crate) fn submit_on_counter(
        &self,
        jobs: Vec<Job>,
        priority: JobPriority,
        id: CounterId,
    ) {
        #[cfg(feature = "metrics")]
        self.metrics.record_submitted(jobs.len() as u64);

        let mut state = self.state.lock().unwrap();
        {
            let slot = state.counters.slot(id);
            assert_eq!(
                slot.remaining(),
                jobs.len(),
                "resubmitted batch size must match the reset counter"
            );
            assert!(!slot.has_waiters(), "resubmitted on a counter with parked waiters");
        }
        for job in jobs {
            state.job_queues[priority.index()].push_back(QueuedJob {
                job,
                counter: Some(id),
            });
        }
        drop(state);
        self.events.notify_all();
    }

    pub(crate) fn request_shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        drop(state);
        self.events.notify_all();
    }
}

/// The public scheduler handle.
///
/// Owns the worker threads and the shared state. Construction spawns all
/// workers; the engine-style entry point that converts the calling thread
/// into worker 0 is [`initialize_jobs`].
pub struct JobSystem {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl JobSystem {
    /// Creates a job system with `worker_threads` workers (0 = one per
    /// logical CPU) and default pool sizing.
    pub fn new(worker_threads: usize) -> Self {
        Self::new_with_config(JobSystemConfig {
            worker_threads,
            ..JobSystemConfig::default()
        })
    }

    pub fn new_with_config(config: JobSystemConfig) -> Self {
        let shared = Shared::build(config);
        let workers = (0..shared.worker_count)
            .map(|index| worker::spawn(Arc::clone(&shared), index))
            .collect();
        JobSystem { shared, workers }
    }

    /// Submits a batch fire-and-forget: no counter, nothing to wait on.
    pub fn run_jobs(&self, jobs: Vec<Job>, priority: JobPriority) {
        self.shared.submit(jobs, priority, None);
    }

    /// Submits a batch and returns a counter tracking its completion.
    pub fn run_jobs_with_counter(&self, jobs: Vec<Job>, priority: JobPriority) -> JobCounter {
        self.shared.submit_with_new_counter(jobs, priority)
    }

    /// Resubmits an identically-sized batch against a reset counter. Used
    /// for repeated per-frame job graphs that keep one counter alive.
    pub fn run_jobs_on_counter(
        &self,
        jobs: Vec<Job>,
        priority: JobPriority,
        counter: &JobCounter,
    ) {
        self.shared.submit_on_counter(jobs, priority, counter.id());
    }

    /// Convenience forward to [`JobCounter::wait`].
    pub fn wait_for_counter(&self, counter: &JobCounter) {
        counter.wait();
    }

    /// Number of worker threads in this scheduler.
    pub fn worker_thread_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Waits for all submitted work to drain, then stops and joins every
    /// worker. Returns Err with a count if any worker thread panicked.
    pub fn shutdown(mut self) -> Result<(), String> {
        {
            let mut state = self.shared.state.lock().unwrap();
            while !state.is_quiescent() {
                state = self.shared.events.wait(state).unwrap();
            }
            state.shutdown = true;
        }
        self.shared.events.notify_all();

        let mut failed = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                failed += 1;
            }
        }
        if failed > 0 {
            Err(format!("{failed} worker thread(s) panicked"))
        } else {
            Ok(())
        }
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> crate::metrics::MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.request_shutdown();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Engine startup: builds the scheduler, spawns workers `1..N-1`, seeds
/// `initial` as the single high-priority bootstrap job, then turns the
/// calling thread into worker 0 and runs the scheduling loop on it.
///
/// Returns only by exiting the process, after some job has called
/// [`crate::Context::request_shutdown`].
pub fn initialize_jobs(config: JobSystemConfig, initial: Job) -> ! {
    let shared = Shared::build(config);
    let spawned: Vec<JoinHandle<()>> = (1..shared.worker_count)
        .map(|index| worker::spawn(Arc::clone(&shared), index))
        .collect();

    shared.submit(vec![initial], JobPriority::High, None);
    worker::worker_loop(&shared, 0);

    for handle in spawned {
        let _ = handle.join();
    }
    std::process::exit(0)
}
