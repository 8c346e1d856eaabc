//! Parallel iteration helpers built on batched job submission.

use crate::counter::JobCounter;
use crate::job::{Job, JobPriority};
use crate::job_system::JobSystem;
use std::ops::Range;
use std::sync::Arc;

struct UnsafeSlice<T> {
    slice: *mut [T],
}

unsafe impl<T> Send for UnsafeSlice<T> {}
unsafe impl<T> Sync for UnsafeSlice<T> {}

impl<T> UnsafeSlice<T> {
    fn new(slice: &mut [T]) -> Self {
        Self {
            slice: slice as *mut [T],
        }
    }

    /// Safety: caller must ensure disjoint access from other threads.
    unsafe fn get_mut<'a>(&self, index: usize) -> &'a mut T {
        unsafe { &mut (*self.slice)[index] }
    }
}

impl<T> Copy for UnsafeSlice<T> {}
impl<T> Clone for UnsafeSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl JobSystem {
    /// Splits `range` into one chunk per worker (rounded up) and submits a
    /// Normal-priority job per chunk, each invoking `op` for every index
    /// in its chunk. Returns the batch counter.
    pub fn parallel_for<F>(&self, range: Range<usize>, op: F) -> JobCounter
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let len = range.end.saturating_sub(range.start);
        let chunks = self.worker_thread_count().max(1);
        let chunk_size = len.div_ceil(chunks).max(1);
        let op = Arc::new(op);

        let mut jobs = Vec::new();
        let mut begin = range.start;
        while begin < range.end {
            let end = (begin + chunk_size).min(range.end);
            let op = Arc::clone(&op);
            jobs.push(Job::new(move |_| {
                for i in begin..end {
                    op(i);
                }
            }));
            begin = end;
        }
        self.run_jobs_with_counter(jobs, JobPriority::Normal)
    }
}

pub trait ParallelSlice<T> {
    fn par_iter<'a>(&'a self, system: &'a JobSystem) -> ParallelIter<'a, T>;
}

pub trait ParallelSliceMut<T> {
    fn par_iter_mut<'a>(&'a mut self, system: &'a JobSystem) -> ParallelIterMut<'a, T>;
}

impl<T: Sync> ParallelSlice<T> for [T] {
    fn par_iter<'a>(&'a self, system: &'a JobSystem) -> ParallelIter<'a, T> {
        ParallelIter {
            slice: self,
            system,
        }
    }
}

impl<T: Send> ParallelSliceMut<T> for [T] {
    fn par_iter_mut<'a>(&'a mut self, system: &'a JobSystem) -> ParallelIterMut<'a, T> {
        ParallelIterMut {
            slice: self,
            system,
        }
    }
}

pub struct ParallelIter<'a, T> {
    slice: &'a [T],
    system: &'a JobSystem,
}

impl<'a, T: Sync + 'static> ParallelIter<'a, T> {
    pub fn for_each<F>(self, op: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let len = self.slice.len();
        let unsafe_slice = UnsafeSlice {
            slice: std::ptr::slice_from_raw_parts_mut(self.slice.as_ptr() as *mut T, len),
        };
        let counter = self.system.parallel_for(0..len, move |i| {
            // Safety: index i is visited by exactly one chunk, read-only.
            let item = unsafe { &*(unsafe_slice.get_mut(i) as *const T) };
            op(item);
        });
        counter.wait();
        counter.release();
    }
}

pub struct ParallelIterMut<'a, T> {
    slice: &'a mut [T],
    system: &'a JobSystem,
}

impl<'a, T: Send + 'static> ParallelIterMut<'a, T> {
    pub fn for_each<F>(self, op: F)
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let len = self.slice.len();
        let unsafe_slice = UnsafeSlice::new(self.slice);
        let counter = self.system.parallel_for(0..len, move |i| {
            // Safety: parallel_for hands out disjoint index ranges.
            let item = unsafe { unsafe_slice.get_mut(i) };
            op(item);
        });
        counter.wait();
        counter.release();
    }
}
