//! Chrome Tracing collector for scheduler visualization.
//!
//! Records dispatch/run/wait spans into thread-local buffers with no
//! cross-thread contention, then exports them as a JSON file readable by
//! chrome://tracing or ui.perfetto.dev. Span recording in the worker loop
//! is compiled in only with the `trace` feature; the collector itself is
//! always available so tools and tests can use it directly.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// One completed span in Chrome Tracing "complete event" form.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub name: &'static str,
    /// Worker index, shown as the trace's thread lane.
    pub worker: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static TRACE_BUFFER: RefCell<Vec<TraceEvent>> = RefCell::new(Vec::with_capacity(4096));
}

lazy_static::lazy_static! {
    static ref GLOBAL_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
    static ref ALL_BUFFERS: Mutex<Vec<Vec<TraceEvent>>> = Mutex::new(Vec::new());
}

/// Records a span of scheduler work on the current thread's buffer.
pub fn record_event(name: &'static str, worker: usize, start: Instant, duration: std::time::Duration) {
    let start_us = (start.duration_since(*GLOBAL_START).as_micros() as u64) + *EPOCH_START_US;
    TRACE_BUFFER.with(|buf| {
        buf.borrow_mut().push(TraceEvent {
            name,
            worker,
            start_us,
            duration_us: duration.as_micros() as u64,
        });
    });
}

/// Flushes the current thread's buffer into the global list. Each worker
/// does this when its scheduling loop exits.
pub fn collect_local_trace() {
    TRACE_BUFFER.with(|buf| {
        let mut local = buf.borrow_mut();
        if !local.is_empty() {
            ALL_BUFFERS.lock().unwrap().push(std::mem::take(&mut *local));
        }
    });
}

/// Writes all collected spans to `path` in Chrome Tracing JSON.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let buffers = ALL_BUFFERS.lock().unwrap();
    write!(writer, "[\n")?;
    let mut first = true;
    for buffer in buffers.iter() {
        for event in buffer {
            if !first {
                write!(writer, ",\n")?;
            }
            first = false;
            write!(
                writer,
                "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                event.name, event.start_us, event.duration_us, event.worker
            )?;
        }
    }
    write!(writer, "\n]\n")?;
    writer.flush()
}

/// RAII span: records from construction to drop.
pub struct TraceGuard {
    name: &'static str,
    worker: usize,
    start: Instant,
}

impl TraceGuard {
    pub fn new(name: &'static str, worker: usize) -> Self {
        Self {
            name,
            worker,
            start: Instant::now(),
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        record_event(self.name, self.worker, self.start, self.start.elapsed());
    }
}

/// RAII guard that flushes the local buffer when the owning worker exits.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_local_trace();
    }
}
