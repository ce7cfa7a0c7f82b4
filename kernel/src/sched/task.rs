//! Thread control block and the saved-register context it carries between
//! context switches.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::aarch64::trapframe::TrapFrame;

pub type ThreadId = u64;

/// Callee-saved integer registers plus the stack pointer -- exactly what
/// [`crate::arch::aarch64::context::context_switch`] needs to suspend one
/// thread and resume another. x0-x18 and x30's return address are caller-
/// saved by the AAPCS64 and so never need to survive a cooperative switch;
/// x30 here is the resume PC, not a return address.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    pub x29: u64,
    pub x30: u64,
    pub sp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Exited,
}

/// A kernel (or bootstrap-of-user) thread.
///
/// `saved_frame`/`saved_elr` hold the preempt-path state synthesized by
/// [`Thread::new`] so that the very first resumption of a thread can be
/// driven either cooperatively (via `ctx`, from [`super::scheduler::yield_now`])
/// or by a timer preemption landing in the exception path -- both must end
/// up executing `entry(arg)`.
pub struct Thread {
    pub id: ThreadId,
    pub ctx: Context,
    pub stack_base: usize,
    pub stack_size: usize,
    pub state: ThreadState,
    /// Trap frame to restore if this thread is entered via the IRQ return
    /// path rather than a cooperative `context_switch`.
    pub saved_frame: TrapFrame,
    pub saved_elr: u64,
}

extern "C" {
    fn thread_trampoline();
}

impl Thread {
    /// Builds a thread whose stack holds a synthesized `Context` such that
    /// resuming it (cooperatively) lands in `thread_trampoline`, which in
    /// turn calls `entry(arg)` with x19/x20 as carried by the context.
    pub fn new(id: ThreadId, entry: extern "C" fn(usize), arg: usize, stack: &mut [u8]) -> Self {
        let stack_base = stack.as_ptr() as usize;
        let stack_size = stack.len();
        let sp_top = (stack_base + stack_size) & !0xf;

        let ctx = Context {
            x19: entry as usize as u64,
            x20: arg as u64,
            x30: thread_trampoline as usize as u64,
            sp: sp_top as u64,
            ..Context::default()
        };

        let mut saved_frame = TrapFrame::default();
        saved_frame.set_reg(19, entry as usize as u64);
        saved_frame.set_reg(20, arg as u64);

        Self {
            id,
            ctx,
            stack_base,
            stack_size,
            state: ThreadState::Ready,
            saved_frame,
            saved_elr: thread_trampoline as usize as u64,
        }
    }
}

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

pub fn alloc_tid() -> ThreadId {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}
