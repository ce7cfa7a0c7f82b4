//! Fixed-array round-robin scheduler.
//!
//! Single core, so the "ready queue" is just a small array scanned starting
//! after the current slot. No priorities, no vruntime: plain round robin
//! over kernel threads, with the user-task layer handled separately in
//! `usersched`.

use crate::arch::aarch64::context::context_switch;
use crate::arch::aarch64::trapframe::TrapFrame;

use super::task::{Context, Thread, ThreadId, ThreadState};

const MAX_THREADS: usize = 16;

pub struct Scheduler {
    threads: [Option<Thread>; MAX_THREADS],
    current: usize,
    boot_ctx: Context,
}

impl Scheduler {
    const NONE: Option<Thread> = None;

    pub const fn new() -> Self {
        Self {
            threads: [Self::NONE; MAX_THREADS],
            current: 0,
            boot_ctx: Context {
                x19: 0,
                x20: 0,
                x21: 0,
                x22: 0,
                x23: 0,
                x24: 0,
                x25: 0,
                x26: 0,
                x27: 0,
                x28: 0,
                x29: 0,
                x30: 0,
                sp: 0,
            },
        }
    }

    pub fn init(&mut self) {
        self.threads = [Self::NONE; MAX_THREADS];
        self.current = 0;
    }

    /// Installs a runnable thread. Panics if every slot is occupied -- the
    /// slot count bounds how many kernel threads this kernel ever creates,
    /// not a runtime resource meant to be exhausted gracefully.
    pub fn add(&mut self, thread: Thread) -> ThreadId {
        let id = thread.id;
        for slot in self.threads.iter_mut() {
            if slot.is_none() {
                *slot = Some(thread);
                return id;
            }
        }
        panic!("scheduler: no free thread slot");
    }

    fn pick_next(&self) -> Option<usize> {
        for offset in 1..=MAX_THREADS {
            let idx = (self.current + offset) % MAX_THREADS;
            if let Some(t) = &self.threads[idx] {
                if t.state != ThreadState::Exited {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// Cooperative yield. Caller must already have interrupts masked.
    pub fn yield_now(&mut self) {
        let Some(next) = self.pick_next() else {
            return;
        };
        if next == self.current {
            return;
        }
        let prev = self.current;
        self.current = next;

        if let Some(t) = &mut self.threads[next] {
            t.state = ThreadState::Running;
        }
        let next_ctx: *mut Context = &mut self.threads[next].as_mut().unwrap().ctx;
        let prev_ctx: *mut Context = match &mut self.threads[prev] {
            Some(t) => {
                t.state = ThreadState::Ready;
                &mut t.ctx
            }
            None => &mut self.boot_ctx,
        };

        // SAFETY: `prev_ctx` and `next_ctx` address distinct live `Context`
        // values owned by this scheduler and never alias.
        unsafe {
            context_switch(prev_ctx, next_ctx);
        }
    }

    /// Enters the first runnable thread from the boot stack. Never returns.
    pub fn start(&mut self) -> ! {
        let first = self
            .pick_next()
            .expect("scheduler: no runnable thread at start");
        self.current = first;
        if let Some(t) = &mut self.threads[first] {
            t.state = ThreadState::Running;
        }
        let next_ctx: *mut Context = &mut self.threads[first].as_mut().unwrap().ctx;
        let boot_ctx: *mut Context = &mut self.boot_ctx;

        // SAFETY: `boot_ctx` is a throwaway save slot never resumed again;
        // `next_ctx` addresses the chosen thread's live context.
        unsafe {
            context_switch(boot_ctx, next_ctx);
        }
        unreachable!("scheduler: start() resumed the boot context");
    }

    /// Preemptive entry point from the timer IRQ path. Stores the
    /// interrupted frame into the current thread, picks the next runnable
    /// thread, and hands its saved frame back to the exception epilogue.
    pub fn on_irq(&mut self, frame: &TrapFrame, resume_pc: u64) -> (TrapFrame, u64) {
        if let Some(t) = &mut self.threads[self.current] {
            t.saved_frame = *frame;
            t.saved_elr = resume_pc;
            if t.state == ThreadState::Running {
                t.state = ThreadState::Ready;
            }
        }

        let next = self.pick_next().unwrap_or(self.current);
        self.current = next;
        let t = self.threads[next]
            .as_mut()
            .expect("on_irq: empty slot picked");
        t.state = ThreadState::Running;
        (t.saved_frame, t.saved_elr)
    }

    pub fn on_thread_exit(&mut self) -> ! {
        if let Some(t) = &mut self.threads[self.current] {
            t.state = ThreadState::Exited;
        }
        let Some(next) = self.pick_next() else {
            panic!("scheduler: last thread exited");
        };
        self.current = next;
        if let Some(t) = &mut self.threads[next] {
            t.state = ThreadState::Running;
        }
        let next_ctx: *mut Context = &mut self.threads[next].as_mut().unwrap().ctx;
        let mut discard = Context::default();

        // SAFETY: `discard` is never read again; `next_ctx` addresses the
        // chosen thread's live context.
        unsafe {
            context_switch(&mut discard, next_ctx);
        }
        unreachable!("on_thread_exit: resumed an exited thread's save slot");
    }
}
