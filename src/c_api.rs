//! C API over the job system, for engine modules written in C.
//!
//! Jobs cross the boundary as a procedure pointer plus an opaque argument.
//! The `JobSystem` handle is an opaque pointer to a boxed `Arc`, so the
//! reference count survives the FFI round trip.

use crate::counter::JobCounter;
use crate::job::{Job, JobPriority};
use crate::job_system::JobSystem;
use std::ffi::c_void;
use std::sync::Arc;

/// A C job body: procedure plus opaque argument.
pub type JobProcedure = extern "C" fn(*mut c_void);

struct SendArg(*mut c_void);
unsafe impl Send for SendArg {}

fn priority_from_raw(priority: u32) -> JobPriority {
    match priority {
        0 => JobPriority::High,
        1 => JobPriority::Normal,
        _ => JobPriority::Low,
    }
}

/// Creates a job system handle. `worker_threads == 0` means one worker per
/// logical CPU.
///
/// # Safety
/// The caller must eventually pass the handle to [`fibersched_destroy`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_create(worker_threads: usize) -> *mut JobSystem {
    let system = Arc::new(JobSystem::new(worker_threads));
    Box::into_raw(Box::new(system)) as *mut JobSystem
}

/// Destroys a job system handle created by [`fibersched_create`].
///
/// # Safety
/// `handle` must be a valid pointer from `fibersched_create` and must not
/// be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_destroy(handle: *mut JobSystem) {
    if handle.is_null() {
        return;
    }
    unsafe { drop(Box::from_raw(handle as *mut Arc<JobSystem>)) };
}

/// Submits `count` (procedure, argument) pairs at `priority`
/// (0 = high, 1 = normal, 2 = low) and returns the batch counter.
///
/// # Safety
/// `handle` must be valid; `procedures` and `arguments` must point to
/// `count` readable entries; each argument must stay valid until its job
/// has run. The returned counter must be passed to
/// [`fibersched_release_counter`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_run_jobs(
    handle: *mut JobSystem,
    procedures: *const JobProcedure,
    arguments: *const *mut c_void,
    count: usize,
    priority: u32,
) -> *mut JobCounter {
    let system = unsafe { &*(handle as *const Arc<JobSystem>) };
    let mut jobs = Vec::with_capacity(count);
    for i in 0..count {
        let procedure = unsafe { *procedures.add(i) };
        let argument = SendArg(unsafe { *arguments.add(i) });
        jobs.push(Job::new(move |_| {
            let argument = argument;
            procedure(argument.0)
        }));
    }
    let counter = system.run_jobs_with_counter(jobs, priority_from_raw(priority));
    Box::into_raw(Box::new(counter))
}

/// Blocks until every job tracked by `counter` has finished.
///
/// # Safety
/// `counter` must be a live pointer from [`fibersched_run_jobs`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_wait_counter(counter: *mut JobCounter) {
    let counter = unsafe { &*counter };
    counter.wait();
}

/// Releases a finished counter back to the scheduler's pool.
///
/// # Safety
/// `counter` must be a live pointer from [`fibersched_run_jobs`]; it must
/// not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_release_counter(counter: *mut JobCounter) {
    if counter.is_null() {
        return;
    }
    let counter = unsafe { Box::from_raw(counter) };
    counter.release();
}

/// Number of worker threads in the scheduler.
///
/// # Safety
/// `handle` must be a valid pointer from `fibersched_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fibersched_worker_thread_count(handle: *mut JobSystem) -> usize {
    let system = unsafe { &*(handle as *const Arc<JobSystem>) };
    system.worker_thread_count()
}
