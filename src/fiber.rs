//! Fibers: stackful execution contexts that jobs run on.
//!
//! A fiber pairs a `corosensei` coroutine with an owned fixed-size stack and
//! a mutable binding describing the job currently running on it. Workers
//! switch into a fiber to run or resume a job and get control back when the
//! job either finishes or parks itself on a counter. A fiber that parks
//! keeps its stack and register state exactly as left; execution continues
//! mid-function when some worker later switches back into it.
//!
//! The raw save-registers/swap-stack primitive lives entirely inside
//! `corosensei`, implemented once per OS/ISA. Everything in this crate above
//! it operates on opaque coroutine handles.

use crate::context::Context;
use crate::counter::CounterId;
use crate::job::{Job, JobPriority};
use crate::job_system::Shared;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Raw pointer to a fiber, passed into the trampoline so it can stash its
/// yielder. Only ever dereferenced by the worker thread currently running
/// the fiber.
#[derive(Clone, Copy)]
pub(crate) struct FiberPtr(pub(crate) *mut Fiber);

unsafe impl Send for FiberPtr {}

/// Value passed into a fiber on each switch.
pub(crate) enum FiberInput {
    /// Begin a fresh job on an idle fiber.
    Start {
        job: Job,
        shared: Arc<Shared>,
        fiber: FiberPtr,
    },
    /// Continue a fiber parked in `JobCounter::wait`.
    Resume,
}

/// Value a fiber yields back to the worker's home context.
pub(crate) enum FiberYield {
    /// The job called `wait` on an unfinished counter; park this fiber.
    Wait(CounterId),
    /// The job function returned; the fiber is ready for reuse.
    Finished,
}

/// Outcome of switching into a fiber, as seen by the worker loop.
pub(crate) enum FiberState {
    Finished,
    Waiting(CounterId),
}

/// What the fiber is currently executing: set by the worker when it binds a
/// queued job, consumed when the job finishes. Survives parking so the
/// worker knows which resumable queue and which counter the fiber belongs
/// to.
#[derive(Clone, Copy)]
pub(crate) struct JobBinding {
    pub priority: JobPriority,
    pub counter: Option<CounterId>,
}

thread_local! {
    static CURRENT_FIBER: Cell<Option<FiberPtr>> = const { Cell::new(None) };
}

/// A reusable stackful execution context.
///
/// Created once at startup into the scheduler's fixed pool and recycled for
/// successive jobs; never destroyed during normal operation. The trampoline
/// loops forever: run a job, yield `Finished`, await the next `Start`.
pub struct Fiber {
    /// The underlying coroutine. The 'static stack lifetime is a lie to
    /// make the self-reference workable; `coroutine` is declared before
    /// `stack` so it drops first.
    coroutine: Option<Coroutine<FiberInput, FiberYield, (), &'static mut DefaultStack>>,

    /// The stack backing the coroutine.
    #[allow(dead_code)]
    stack: Box<DefaultStack>,

    /// The yielder for this fiber, set by the trampoline on first start.
    /// Valid only while the fiber is running or parked.
    yielder: *const Yielder<FiberInput, FiberYield>,

    /// The job currently bound to this fiber, if any.
    binding: Option<JobBinding>,
}

unsafe impl Send for Fiber {}

impl Fiber {
    /// Creates a fiber with its own stack of `stack_size` bytes.
    ///
    /// Stack exhaustion inside a job hits the guard page and aborts the
    /// process; there is no recovery.
    pub(crate) fn new(stack_size: usize) -> Self {
        let mut stack = Box::new(
            DefaultStack::new(stack_size).expect("failed to allocate fiber stack"),
        );

        // SAFETY: `coroutine` is dropped before `stack` (field order).
        let stack_ref = unsafe {
            std::mem::transmute::<&mut DefaultStack, &'static mut DefaultStack>(stack.as_mut())
        };

        let coroutine = Coroutine::with_stack(stack_ref, move |yielder, mut input: FiberInput| {
            loop {
                if let FiberInput::Start { job, shared, fiber } = input {
                    // SAFETY: the worker that switched into us owns the
                    // fiber box; the pointer is valid for the whole run.
                    unsafe {
                        (*fiber.0).yielder = yielder as *const _;
                    }
                    let ctx = Context::new(&shared);
                    let result = catch_unwind(AssertUnwindSafe(|| job.invoke(&ctx)));
                    if let Err(payload) = result {
                        // A panicking job is a contract violation. Unwinding
                        // across the context-switch boundary is UB, so log
                        // and take the process down here.
                        eprintln!("[fibersched] job panicked: {}", panic_message(&payload));
                        std::process::abort();
                    }
                }
                input = yielder.suspend(FiberYield::Finished);
            }
        });

        Fiber {
            coroutine: Some(coroutine),
            stack,
            yielder: std::ptr::null(),
            binding: None,
        }
    }

    /// Records which queued job this fiber is about to run.
    pub(crate) fn bind(&mut self, binding: JobBinding) {
        debug_assert!(self.binding.is_none(), "fiber already bound to a job");
        self.binding = Some(binding);
    }

    /// Clears and returns the binding once the job has finished.
    pub(crate) fn take_binding(&mut self) -> JobBinding {
        self.binding.take().expect("finished fiber had no job bound")
    }

    /// The priority of the job bound to this fiber. Used to pick the
    /// resumable queue a parked fiber re-enters.
    pub(crate) fn binding_priority(&self) -> JobPriority {
        self.binding.expect("parked fiber had no job bound").priority
    }

    /// Switches into an idle fiber to start a fresh job. Returns when the
    /// job finishes or parks.
    pub(crate) fn run(&mut self, job: Job, shared: Arc<Shared>) -> FiberState {
        let fiber = FiberPtr(self as *mut Fiber);
        self.switch_in(FiberInput::Start { job, shared, fiber })
    }

    /// Switches back into a fiber parked inside `JobCounter::wait`.
    pub(crate) fn resume_waiting(&mut self) -> FiberState {
        self.switch_in(FiberInput::Resume)
    }

    fn switch_in(&mut self, input: FiberInput) -> FiberState {
        let self_ptr = self as *mut Fiber;
        let coroutine = self
            .coroutine
            .as_mut()
            .expect("fiber coroutine missing");

        CURRENT_FIBER.set(Some(FiberPtr(self_ptr)));
        let result = coroutine.resume(input);
        CURRENT_FIBER.set(None);

        match result {
            CoroutineResult::Yield(FiberYield::Finished) => FiberState::Finished,
            CoroutineResult::Yield(FiberYield::Wait(id)) => FiberState::Waiting(id),
            // The trampoline loops forever; a return would mean the
            // coroutine was force-unwound, which only happens on drop.
            CoroutineResult::Return(()) => FiberState::Finished,
        }
    }
}

/// Handle to the fiber currently running on this thread, if the caller is
/// executing inside a job.
pub(crate) fn current() -> Option<FiberPtr> {
    CURRENT_FIBER.get()
}

/// Suspends the currently running fiber, switching back to the worker
/// thread's home context. Must never be called while holding the scheduler
/// lock. Execution continues after this call once a worker switches back
/// into the fiber.
pub(crate) fn suspend_current(reason: FiberYield) {
    let handle = current().expect("fiber suspension requested outside of a job");
    // SAFETY: CURRENT_FIBER is only set while the fiber is running on this
    // thread, and the yielder was stored by the trampoline at start.
    unsafe {
        let fiber = &*handle.0;
        debug_assert!(!fiber.yielder.is_null());
        let yielder = &*fiber.yielder;
        let input = yielder.suspend(reason);
        debug_assert!(matches!(input, FiberInput::Resume));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
