//! # fibersched - Fiber-Based Job Scheduler
//!
//! The task-parallel execution core of a game engine: work is decomposed
//! into short jobs, distributed across a fixed pool of worker threads (one
//! per logical CPU), and suspended/resumed without blocking a worker
//! thread by switching between lightweight stackful contexts (fibers).
//!
//! ## Architecture
//!
//! - **Fibers**: pre-allocated stackful execution contexts, recycled across
//!   jobs, parked mid-function when a job waits on a dependency
//! - **Priority job queues**: three FIFO queues (high/normal/low) of
//!   not-yet-started jobs
//! - **Resumable queues**: parked fibers whose dependency was satisfied,
//!   per priority
//! - **Job counters**: per-batch countdown objects; `wait` parks the
//!   calling fiber until the batch finishes
//! - **Worker threads**: one per logical CPU, each running the scheduling
//!   loop; all shared state behind a single global lock
//!
//! ## Example
//!
//! ```no_run
//! use fibersched::{Job, JobPriority, JobSystem};
//!
//! let system = JobSystem::new(4);
//!
//! let counter = system.run_jobs_with_counter(
//!     vec![Job::new(|_| println!("hello from a fiber job"))],
//!     JobPriority::Normal,
//! );
//! counter.wait();
//! counter.release();
//! ```

pub mod c_api;
pub mod context;
pub mod counter;
pub mod fiber;
pub mod fiber_pool;
pub mod iter;
pub mod job;
pub mod job_system;
pub mod metrics;
pub mod topology;
pub mod tracing;
pub mod worker;

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (worker i -> logical CPU i).
    Linear,
    /// Pin to physical cores only (even-numbered logical CPUs), avoiding
    /// SMT contention.
    AvoidSMT,
}

pub use context::Context;
pub use counter::JobCounter;
pub use iter::{ParallelSlice, ParallelSliceMut};
pub use job::{Job, JobPriority};
pub use job_system::{JobSystem, JobSystemConfig, initialize_jobs};
pub use topology::{Topology, worker_thread_count};
