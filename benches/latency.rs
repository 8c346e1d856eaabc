//! Single-job round-trip latency: submit, dispatch onto a fiber, run,
//! reconcile, wake the waiter.

use criterion::{Criterion, criterion_group, criterion_main};
use fibersched::{Job, JobPriority, JobSystem};

fn bench_single_job_roundtrip(c: &mut Criterion) {
    let system = JobSystem::new(1);

    c.bench_function("single_job_roundtrip", |b| {
        b.iter(|| {
            let counter =
                system.run_jobs_with_counter(vec![Job::new(|_| {})], JobPriority::High);
            counter.wait();
            counter.release();
        });
    });

    system.shutdown().expect("shutdown failed");
}

fn bench_wait_on_finished_counter(c: &mut Criterion) {
    let system = JobSystem::new(1);

    let counter = system.run_jobs_with_counter(vec![Job::new(|_| {})], JobPriority::Normal);
    counter.wait();

    c.bench_function("wait_already_finished", |b| {
        b.iter(|| {
            counter.wait();
        });
    });

    counter.release();
    system.shutdown().expect("shutdown failed");
}

criterion_group!(benches, bench_single_job_roundtrip, bench_wait_on_finished_counter);
criterion_main!(benches);
