//! Two-slot user-task scheduler.
//!
//! Owns exactly two `Proc` records at fixed virtual-address bases, alternated
//! by the yield syscall. Unlike the source this was adapted from, a yield
//! preserves the full trap frame of the outgoing task instead of restarting
//! it from its entry point -- see DESIGN.md's open-question resolution.

use crate::arch::aarch64::trapframe::TrapFrame;
use crate::arch::aarch64::usermode::enter_usermode;
use crate::mm::PageFlags;

pub const P0_BASE: u64 = 0x1_0000_0000;
pub const P1_BASE: u64 = 0x2_0000_0000;
const STACK_OFFSET: u64 = 0x10000;
const STACK_SIZE: u64 = 0x4000;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Runnable,
    Exited,
}

pub struct Proc {
    pub code_va: u64,
    pub stack_va: u64,
    pub arg: u8,
    pub frame: TrapFrame,
    pub elr: u64,
    /// SP_EL0 this proc last ran with, restored on resume. Initialized to
    /// the aligned top of its stack; a yield before entry never happens, so
    /// this is the only value proc 0 ever needs before its first trap.
    pub sp: u64,
    pub state: ProcState,
}

impl Proc {
    fn initial_user_sp(base: u64) -> u64 {
        (base + STACK_OFFSET + STACK_SIZE) & !0xf
    }

    fn new(base: u64, arg: u8) -> Self {
        let mut frame = TrapFrame::default();
        frame.set_reg(0, arg as u64);
        Self {
            code_va: base,
            stack_va: base + STACK_OFFSET,
            arg,
            frame,
            elr: base,
            sp: Self::initial_user_sp(base),
            state: ProcState::Runnable,
        }
    }
}

pub struct UserSched {
    procs: [Proc; 2],
    current: usize,
}

impl UserSched {
    /// Maps each task's code and stack pages and copies `blob` into both.
    /// Each proc's argument character is passed through x0 on first entry,
    /// per `start_ab`.
    pub fn new(blob: &[u8]) -> crate::error::KernelResult<Self> {
        map_and_load(P0_BASE, blob)?;
        map_and_load(P1_BASE, blob)?;
        Ok(Self {
            procs: [Proc::new(P0_BASE, b'A'), Proc::new(P1_BASE, b'B')],
            current: 0,
        })
    }

    /// Enters proc 0. Never returns.
    pub fn start_ab(&mut self) -> ! {
        let p = &self.procs[0];
        let sp = Proc::initial_user_sp(p.code_va);
        // SAFETY: `init` mapped `p.code_va`/`sp` user-executable/-writable
        // and the exception vectors are installed before this is called.
        unsafe { enter_usermode(p.code_va, sp, p.arg as u64) }
    }

    /// Called from the SVC yield handler. Saves `frame`/`elr`/`sp_el0` into
    /// the current proc, switches to the peer, and returns the peer's saved
    /// frame, resume PC, and SP_EL0 for the exception epilogue to restore.
    pub fn on_yield(&mut self, frame: &TrapFrame, elr: u64, sp_el0: u64) -> (TrapFrame, u64, u64) {
        self.procs[self.current].frame = *frame;
        self.procs[self.current].elr = elr;
        self.procs[self.current].sp = sp_el0;
        self.current = 1 - self.current;
        let p = &self.procs[self.current];
        (p.frame, p.elr, p.sp)
    }

    /// Called from the SVC exit handler. Marks the current proc exited and
    /// returns the peer's saved frame/resume PC/SP_EL0 if it is still
    /// runnable, or `None` if both tasks have exited (caller halts).
    pub fn on_exit(&mut self, sp_el0: u64) -> Option<(TrapFrame, u64, u64)> {
        self.procs[self.current].sp = sp_el0;
        self.procs[self.current].state = ProcState::Exited;
        let peer = 1 - self.current;
        if self.procs[peer].state == ProcState::Exited {
            return None;
        }
        self.current = peer;
        let p = &self.procs[peer];
        Some((p.frame, p.elr, p.sp))
    }
}

use core::cell::UnsafeCell;

struct Cell(UnsafeCell<Option<UserSched>>);

// SAFETY: reached only from SVC/exception context with interrupts masked
// on this single-core kernel, same discipline as `super::SchedCell`.
unsafe impl Sync for Cell {}

static USERSCHED: Cell = Cell(UnsafeCell::new(None));

/// Installs the two-task user scheduler from an embedded blob. Must run
/// before `start_ab`.
pub fn init(blob: &[u8]) -> crate::error::KernelResult<()> {
    let sched = UserSched::new(blob)?;
    // SAFETY: single-threaded init, before any concurrent access begins.
    unsafe {
        *USERSCHED.0.get() = Some(sched);
    }
    Ok(())
}

pub fn is_active() -> bool {
    // SAFETY: see `Cell`'s invariant.
    unsafe { (*USERSCHED.0.get()).is_some() }
}

fn get() -> &'static mut UserSched {
    // SAFETY: see `Cell`'s invariant; caller has already checked
    // `is_active()`.
    unsafe { (*USERSCHED.0.get()).as_mut().expect("usersched not active") }
}

pub fn start_ab() -> ! {
    get().start_ab()
}

pub fn on_yield(frame: &TrapFrame, elr: u64, sp_el0: u64) -> (TrapFrame, u64, u64) {
    get().on_yield(frame, elr, sp_el0)
}

pub fn on_exit(sp_el0: u64) -> Option<(TrapFrame, u64, u64)> {
    get().on_exit(sp_el0)
}

fn map_and_load(base: u64, blob: &[u8]) -> crate::error::KernelResult<()> {
    let pages = blob.len().div_ceil(4096).max(1);
    for i in 0..pages {
        let va = base as usize + i * 4096;
        let pa = crate::mm::alloc_and_map(
            va,
            PageFlags::READWRITE | PageFlags::USER,
        )?;
        let _ = pa;
    }
    // SAFETY: the pages just mapped at `base` are freshly allocated,
    // zeroed, and not yet visible to any other context.
    unsafe {
        core::ptr::copy_nonoverlapping(blob.as_ptr(), base as usize as *mut u8, blob.len());
    }
    crate::mm::icache_sync(base as usize, pages * 4096);

    let stack_va = base as usize + STACK_OFFSET as usize;
    let stack_pages = (STACK_SIZE as usize) / 4096;
    for i in 0..stack_pages {
        crate::mm::alloc_and_map(
            stack_va + i * 4096,
            PageFlags::READWRITE | PageFlags::USER | PageFlags::NOEXEC,
        )?;
    }
    Ok(())
}
