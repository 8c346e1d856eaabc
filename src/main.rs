use fibersched::{Job, JobPriority, JobSystemConfig, initialize_jobs};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

fn main() {
    println!("fibersched - fiber-based job scheduler demo\n");

    // Engine-style startup: the calling thread becomes worker 0 and the
    // bootstrap job below drives everything, ending with a shutdown
    // request. initialize_jobs only returns by exiting the process.
    // The demo leaves pinning off (containerized hosts often reject
    // affinity syscalls); engines pass `JobSystemConfig::engine()` instead.
    initialize_jobs(
        JobSystemConfig::default(),
        Job::new(|ctx| {
            println!("bootstrap job running on {} workers", ctx.worker_thread_count());

            // Fan out a batch and wait on its counter.
            let sum = Arc::new(AtomicUsize::new(0));
            let start = Instant::now();
            let jobs = (0..100)
                .map(|i| {
                    let sum = Arc::clone(&sum);
                    Job::new(move |_| {
                        sum.fetch_add(i * i, Ordering::SeqCst);
                    })
                })
                .collect();
            let counter = ctx.run_jobs_with_counter(jobs, JobPriority::Normal);
            ctx.wait_for(&counter);
            counter.release();
            println!(
                "batch of 100 jobs finished in {:?}, sum of squares = {}",
                start.elapsed(),
                sum.load(Ordering::SeqCst)
            );

            // Nested fan-out: each job spawns and waits on its own batch.
            let touched = Arc::new(AtomicUsize::new(0));
            let outer_jobs = (0..4)
                .map(|_| {
                    let touched = Arc::clone(&touched);
                    Job::new(move |ctx| {
                        let touched_inner = Arc::clone(&touched);
                        let inner_jobs = (0..8)
                            .map(|_| {
                                let touched = Arc::clone(&touched_inner);
                                Job::new(move |_| {
                                    touched.fetch_add(1, Ordering::SeqCst);
                                })
                            })
                            .collect();
                        let inner = ctx.run_jobs_with_counter(inner_jobs, JobPriority::High);
                        ctx.wait_for(&inner);
                        inner.release();
                    })
                })
                .collect();
            let outer = ctx.run_jobs_with_counter(outer_jobs, JobPriority::Normal);
            ctx.wait_for(&outer);
            outer.release();
            println!("nested fan-out touched {} leaves", touched.load(Ordering::SeqCst));

            println!("\ndemo complete, shutting down");
            ctx.request_shutdown();
        }),
    );
}
