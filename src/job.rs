//! Job definitions: the unit of work consumed by worker threads.
//!
//! A job is a closure plus an optional counter reference. Jobs are immutable
//! once enqueued and are consumed exactly once by whichever worker dequeues
//! them.

use crate::context::Context;
use crate::counter::CounterId;
use serde::{Deserialize, Serialize};

/// Dispatch precedence for submitted jobs.
///
/// Workers always prefer higher-priority work, resumed or fresh. A
/// continuously runnable high-priority workload can starve low-priority
/// queued jobs; that is accepted scheduler behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    High,
    Normal,
    Low,
}

pub const JOB_PRIORITY_COUNT: usize = 3;

impl JobPriority {
    /// All priorities in dispatch order, highest first.
    pub const ALL: [JobPriority; JOB_PRIORITY_COUNT] =
        [JobPriority::High, JobPriority::Normal, JobPriority::Low];

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            JobPriority::High => 0,
            JobPriority::Normal => 1,
            JobPriority::Low => 2,
        }
    }
}

/// A unit of work to be executed on a fiber.
///
/// The closure receives a [`Context`] granting access to nested submission
/// and counter waits, so a job body can fan out sub-batches and block on
/// them without holding a worker thread hostage.
pub struct Job {
    work: Box<dyn FnOnce(&Context) + Send + 'static>,
}

impl Job {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        Job {
            work: Box::new(work),
        }
    }

    /// Runs the job body. Called only from the fiber trampoline.
    pub(crate) fn invoke(self, ctx: &Context) {
        (self.work)(ctx);
    }
}

/// A job sitting in a priority queue, waiting for a worker and an idle
/// fiber. The counter, if any, is decremented by the worker when the job
/// runs to completion.
pub(crate) struct QueuedJob {
    pub job: Job,
    pub counter: Option<CounterId>,
}
