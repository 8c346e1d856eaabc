//! Integration tests for fiber pool exhaustion: the scheduler must stall
//! and retain queued work rather than crash or drop jobs.

use fibersched::{Job, JobPriority, JobSystem, JobSystemConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

fn tiny_pool_system(workers: usize, fibers: usize) -> JobSystem {
    JobSystem::new_with_config(JobSystemConfig {
        worker_threads: workers,
        fiber_pool_size: fibers,
        stack_size: 128 * 1024,
        ..JobSystemConfig::default()
    })
}

#[test]
fn queued_jobs_stall_then_proceed_when_fibers_free_up() {
    // Two fibers: one runs a slow gate job, one parks waiting on it.
    // The remaining jobs have no fiber and must stall in the queue, then
    // run in submission order once fibers return to the pool.
    let system = tiny_pool_system(2, 2);
    let done = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let gate = Arc::new(system.run_jobs_with_counter(
        vec![Job::new(|_| thread::sleep(Duration::from_millis(60)))],
        JobPriority::Normal,
    ));

    // Parks its fiber on the gate; the pool is now empty.
    let gate_clone = Arc::clone(&gate);
    let done_waiter = Arc::clone(&done);
    let waiter = system.run_jobs_with_counter(
        vec![Job::new(move |ctx| {
            ctx.wait_for(&gate_clone);
            done_waiter.fetch_add(1, Ordering::SeqCst);
        })],
        JobPriority::Normal,
    );

    // Give the gate and waiter time to claim both fibers.
    thread::sleep(Duration::from_millis(20));

    let stalled_jobs: Vec<Job> = (0..4)
        .map(|i| {
            let done = Arc::clone(&done);
            let order = Arc::clone(&order);
            Job::new(move |_| {
                order.lock().unwrap().push(i);
                done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    let stalled = system.run_jobs_with_counter(stalled_jobs, JobPriority::Normal);

    // While the pool is exhausted, none of the queued jobs may run (and
    // nothing may crash).
    thread::sleep(Duration::from_millis(20));
    assert_eq!(done.load(Ordering::SeqCst), 0, "jobs ran with no idle fiber");

    // The gate finishes on its own; fibers free up and queued work drains.
    waiter.wait();
    stalled.wait();

    assert_eq!(done.load(Ordering::SeqCst), 5);
    let mut seen = order.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3], "a stalled job was lost");

    stalled.release();
    waiter.release();
    Arc::try_unwrap(gate)
        .unwrap_or_else(|_| panic!("gate counter still shared"))
        .release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn oversubmission_loses_no_jobs() {
    // Far more jobs than fibers; every one must still run exactly once.
    let system = tiny_pool_system(2, 4);
    let hits = Arc::new(AtomicUsize::new(0));

    let jobs = (0..300)
        .map(|_| {
            let hits = Arc::clone(&hits);
            Job::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    let counter = system.run_jobs_with_counter(jobs, JobPriority::Normal);
    counter.wait();

    assert_eq!(hits.load(Ordering::SeqCst), 300);
    counter.release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn high_priority_fresh_job_stalls_without_a_fiber() {
    // Even a high-priority job cannot start while every fiber is running
    // or parked; it must wait for the pool, not jump past it.
    let system = tiny_pool_system(2, 2);
    let high_ran = Arc::new(AtomicUsize::new(0));

    let gate_open = Arc::new(AtomicBool::new(false));
    let gate_open_clone = Arc::clone(&gate_open);
    let gate = Arc::new(system.run_jobs_with_counter(
        vec![Job::new(move |_| {
            while !gate_open_clone.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        })],
        JobPriority::Normal,
    ));

    // Parks the second fiber; the pool is now empty.
    let gate_clone = Arc::clone(&gate);
    let parked = system.run_jobs_with_counter(
        vec![Job::new(move |ctx| {
            ctx.wait_for(&gate_clone);
        })],
        JobPriority::Low,
    );
    thread::sleep(Duration::from_millis(20));

    let high_ran_clone = Arc::clone(&high_ran);
    let high = system.run_jobs_with_counter(
        vec![Job::new(move |_| {
            high_ran_clone.fetch_add(1, Ordering::SeqCst);
        })],
        JobPriority::High,
    );

    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        high_ran.load(Ordering::SeqCst),
        0,
        "high-priority job ran with no idle fiber"
    );

    gate_open.store(true, Ordering::SeqCst);
    high.wait();
    parked.wait();
    assert_eq!(high_ran.load(Ordering::SeqCst), 1);

    high.release();
    parked.release();
    Arc::try_unwrap(gate)
        .unwrap_or_else(|_| panic!("gate counter still shared"))
        .release();
    system.shutdown().expect("shutdown failed");
}
