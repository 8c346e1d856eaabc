//! CPU topology detection and worker placement.

use crate::PinningStrategy;
use std::collections::HashMap;
use sysinfo::{CpuRefreshKind, System};

/// Default worker count: one thread per logical CPU, as reported by the
/// host.
pub fn worker_thread_count() -> usize {
    num_cpus::get()
}

/// Best-effort view of the host CPU layout.
///
/// Reliable SMT-sibling detection without hwloc-style FFI is shaky on some
/// platforms, so this maps logical CPUs conservatively: the physical count
/// comes from sysinfo and the sibling grouping assumes the common
/// interleaved enumeration (logical 2n and 2n+1 share a core).
#[derive(Debug, Clone)]
pub struct Topology {
    pub logical_cpus: usize,
    pub physical_cores: usize,
    pub core_siblings: HashMap<usize, Vec<usize>>,
}

impl Topology {
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_cpu_specifics(CpuRefreshKind::everything());

        let logical_cpus = system.cpus().len().max(1);
        let physical_cores = system.physical_core_count().unwrap_or(logical_cpus);

        let mut core_siblings: HashMap<usize, Vec<usize>> = HashMap::new();
        let smt_width = (logical_cpus / physical_cores).max(1);
        for cpu in 0..logical_cpus {
            core_siblings.entry(cpu / smt_width).or_default().push(cpu);
        }

        Topology {
            logical_cpus,
            physical_cores,
            core_siblings,
        }
    }

    pub fn has_smt(&self) -> bool {
        self.logical_cpus > self.physical_cores
    }
}

/// Pins the calling worker thread per the configured strategy.
///
/// `Linear` maps worker i to logical CPU i. `AvoidSMT` spreads workers
/// across physical cores first (even-numbered logical CPUs under the
/// common interleaved enumeration). A pinning failure when pinning was
/// requested is fatal at startup: the engine counts on one worker per
/// core.
pub(crate) fn pin_current_thread(strategy: PinningStrategy, worker_index: usize) {
    let target = match strategy {
        PinningStrategy::None => return,
        PinningStrategy::Linear => worker_index,
        PinningStrategy::AvoidSMT => worker_index * 2,
    };

    let Some(cores) = core_affinity::get_core_ids().filter(|cores| !cores.is_empty()) else {
        // The engine cannot run without its per-core worker pool.
        eprintln!("[fibersched] failed to query CPU core ids for worker {worker_index}");
        std::process::abort();
    };
    let core = cores[target % cores.len()];
    if !core_affinity::set_for_current(core) {
        eprintln!("[fibersched] failed to pin worker {worker_index} to core {core:?}");
        std::process::abort();
    }
}
