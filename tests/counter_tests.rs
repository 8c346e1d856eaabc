//! Integration tests for job counter semantics: completion tracking,
//! reuse via reset, and release back to the pool.

use fibersched::{Job, JobPriority, JobSystem};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn counting_jobs(count: usize, hits: &Arc<AtomicUsize>) -> Vec<Job> {
    (0..count)
        .map(|_| {
            let hits = Arc::clone(hits);
            Job::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect()
}

#[test]
fn wait_returns_only_after_whole_batch_finished() {
    // Four independent jobs with a counter, wait called immediately: wait
    // must not return until the shared atomic shows all four ran.
    let system = JobSystem::new(2);
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = system.run_jobs_with_counter(counting_jobs(4, &hits), JobPriority::Normal);
    counter.wait();

    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert!(counter.is_finished());
    counter.release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn counter_reuse_after_reset_reproduces_completion() {
    let system = JobSystem::new(2);
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = system.run_jobs_with_counter(counting_jobs(6, &hits), JobPriority::Normal);
    counter.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 6);

    // Reuse the same counter for a repeated identical batch.
    counter.reset();
    system.run_jobs_on_counter(counting_jobs(6, &hits), JobPriority::Normal, &counter);
    counter.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 12);
    assert!(counter.is_finished());

    counter.release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn repeated_frame_batches_on_one_counter() {
    // A per-frame job graph keeps one counter alive across many frames.
    let system = JobSystem::new(4);
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = system.run_jobs_with_counter(counting_jobs(8, &hits), JobPriority::High);
    counter.wait();

    for _ in 0..20 {
        counter.reset();
        system.run_jobs_on_counter(counting_jobs(8, &hits), JobPriority::High, &counter);
        counter.wait();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 8 * 21);
    counter.release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn external_thread_wait_blocks_until_done() {
    let system = JobSystem::new(2);
    let hits = Arc::new(AtomicUsize::new(0));

    let jobs = (0..4)
        .map(|_| {
            let hits = Arc::clone(&hits);
            Job::new(move |_| {
                thread::sleep(Duration::from_millis(10));
                hits.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let counter = system.run_jobs_with_counter(jobs, JobPriority::Normal);
    assert!(!counter.is_finished() || hits.load(Ordering::SeqCst) == 4);
    counter.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    counter.release();
    system.shutdown().expect("shutdown failed");
}

#[test]
fn many_concurrent_batches_each_complete() {
    // More batches in flight than the default counter pool holds still
    // work; the pool grows instead of blocking submission.
    let system = JobSystem::new(4);
    let hits = Arc::new(AtomicUsize::new(0));

    let counters: Vec<_> = (0..200)
        .map(|_| system.run_jobs_with_counter(counting_jobs(2, &hits), JobPriority::Normal))
        .collect();

    for counter in counters {
        counter.wait();
        counter.release();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 400);
    system.shutdown().expect("shutdown failed");
}

#[test]
fn wait_on_finished_counter_is_immediate() {
    let system = JobSystem::new(2);
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = system.run_jobs_with_counter(counting_jobs(1, &hits), JobPriority::Normal);
    counter.wait();

    // Subsequent waits return without suspension.
    counter.wait();
    counter.wait();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    counter.release();
    system.shutdown().expect("shutdown failed");
}
