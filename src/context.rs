//! Context: the capability handle jobs use to reach the scheduler.
//!
//! Every job body receives a `&Context`, through which it can fan out
//! nested batches, wait on counters, and (for the engine's top-level job)
//! request process shutdown. The context borrows the scheduler's shared
//! state for the duration of the job, so nested submission needs no
//! global variables.

use crate::counter::JobCounter;
use crate::job::{Job, JobPriority};
use crate::job_system::Shared;
use std::sync::Arc;

pub struct Context<'a> {
    shared: &'a Arc<Shared>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>) -> Self {
        Context { shared }
    }

    /// Submits a batch fire-and-forget from inside a job.
    pub fn run_jobs(&self, jobs: Vec<Job>, priority: JobPriority) {
        self.shared.submit(jobs, priority, None);
    }

    /// Submits a batch and returns its counter, so this job can block on
    /// the sub-batch before returning.
    pub fn run_jobs_with_counter(&self, jobs: Vec<Job>, priority: JobPriority) -> JobCounter {
        self.shared.submit_with_new_counter(jobs, priority)
    }

    /// Resubmits an identically-sized batch against a reset counter.
    pub fn run_jobs_on_counter(
        &self,
        jobs: Vec<Job>,
        priority: JobPriority,
        counter: &JobCounter,
    ) {
        self.shared.submit_on_counter(jobs, priority, counter.id());
    }

    /// Blocks this job on a counter. Parks the calling fiber; the worker
    /// thread keeps running other jobs in the meantime.
    pub fn wait_for(&self, counter: &JobCounter) {
        counter.wait();
    }

    /// Number of worker threads in the scheduler this job runs on.
    pub fn worker_thread_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Asks every worker to exit its scheduling loop. Used by the engine's
    /// top-level job to end a run started with
    /// [`crate::initialize_jobs`].
    pub fn request_shutdown(&self) {
        self.shared.request_shutdown();
    }
}
