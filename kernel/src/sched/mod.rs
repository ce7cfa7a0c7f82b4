//! Preemptive round-robin scheduler over kernel threads, plus the
//! two-slot user-task layer in [`usersched`].
//!
//! The scheduler is reached either with interrupts masked (cooperative
//! yield, syscall dispatch) or from the exception path itself (`on_irq`),
//! never concurrently, and this is a single-core kernel -- so it is kept
//! behind a plain [`GlobalState`](crate::sync::GlobalState) rather than a
//! lock that a context switch could leave held across a suspended stack.

pub mod scheduler;
pub mod task;
pub mod usersched;

use core::cell::UnsafeCell;

use self::scheduler::Scheduler;
use self::task::{Thread, ThreadId};

struct SchedCell(UnsafeCell<Scheduler>);

// SAFETY: access is only ever made with interrupts masked or from the
// single-core exception path; see module doc comment.
unsafe impl Sync for SchedCell {}

static SCHEDULER: SchedCell = SchedCell(UnsafeCell::new(Scheduler::new()));

fn sched() -> &'static mut Scheduler {
    // SAFETY: see `SchedCell`'s invariant above.
    unsafe { &mut *SCHEDULER.0.get() }
}

pub fn init() {
    sched().init();
}

pub fn add(thread: Thread) -> ThreadId {
    sched().add(thread)
}

/// Cooperative yield, called from the SYS_yield syscall handler when no
/// user task is active. Interrupts must already be masked by the caller.
pub fn yield_now() {
    sched().yield_now();
}

/// Enters the first runnable thread. Called once from `main` after all
/// kernel threads have been registered. Never returns.
pub fn start() -> ! {
    sched().start();
}

pub fn on_irq(
    frame: &crate::arch::aarch64::trapframe::TrapFrame,
    resume_pc: u64,
) -> (crate::arch::aarch64::trapframe::TrapFrame, u64) {
    sched().on_irq(frame, resume_pc)
}

pub fn on_thread_exit() -> ! {
    sched().on_thread_exit();
}
