//! Randomized stress: many batches of varying size and priority, with
//! nested fan-out, verifying nothing is lost or double-run.

use fibersched::{Job, JobPriority, JobSystem};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn randomized_batches_all_complete() {
    let system = JobSystem::new(4);
    let mut rng = rand::thread_rng();
    let hits = Arc::new(AtomicUsize::new(0));
    let mut expected = 0;

    let priorities = [JobPriority::High, JobPriority::Normal, JobPriority::Low];
    let mut counters = Vec::new();

    for _ in 0..50 {
        let batch_size = rng.gen_range(1..16);
        let priority = priorities[rng.gen_range(0..priorities.len())];
        expected += batch_size;

        let jobs = (0..batch_size)
            .map(|_| {
                let hits = Arc::clone(&hits);
                Job::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        counters.push(system.run_jobs_with_counter(jobs, priority));
    }

    for counter in counters {
        counter.wait();
        counter.release();
    }
    assert_eq!(hits.load(Ordering::SeqCst), expected);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn randomized_nested_fanout_completes() {
    let system = JobSystem::new(4);
    let mut rng = rand::thread_rng();
    let leaves = Arc::new(AtomicUsize::new(0));
    let mut expected = 0;

    let mut counters = Vec::new();
    for _ in 0..12 {
        let fanout = rng.gen_range(1..8);
        expected += fanout;
        let leaves_outer = Arc::clone(&leaves);
        counters.push(system.run_jobs_with_counter(
            vec![Job::new(move |ctx| {
                let jobs = (0..fanout)
                    .map(|_| {
                        let leaves = Arc::clone(&leaves_outer);
                        Job::new(move |_| {
                            leaves.fetch_add(1, Ordering::SeqCst);
                        })
                    })
                    .collect();
                let inner = ctx.run_jobs_with_counter(jobs, JobPriority::High);
                ctx.wait_for(&inner);
                inner.release();
            })],
            JobPriority::Normal,
        ));
    }

    for counter in counters {
        counter.wait();
        counter.release();
    }
    assert_eq!(leaves.load(Ordering::SeqCst), expected);
    system.shutdown().expect("shutdown failed");
}
