//! IRQ routing: acknowledge at the GIC, dispatch by interrupt id, signal
//! end-of-interrupt.
//!
//! The only device-level interrupt actually wired up is the architected
//! timer's PPI. Anything else the GIC hands back is logged and dropped --
//! this platform has no other interrupt-driven device in scope.

use crate::arch::aarch64::timer::TIMER_PPI;
use crate::arch::aarch64::trapframe::TrapFrame;
use crate::arch::aarch64::{gic, timer};

/// Called from the exception dispatcher for every IRQ vector. Returns the
/// trap frame and resume PC to restore -- ordinarily `frame`/`resume_pc`
/// unchanged, but the timer path may hand back a different task's saved
/// state when the scheduler preempts.
pub fn handle(frame: &TrapFrame, resume_pc: u64) -> (TrapFrame, u64) {
    let Some(id) = gic::handle_irq() else {
        return (*frame, resume_pc);
    };

    let result = if id == TIMER_PPI {
        timer::on_irq();
        crate::sched::on_irq(frame, resume_pc)
    } else {
        log::warn!("unhandled IRQ {id}");
        (*frame, resume_pc)
    };

    gic::eoi(id);
    result
}
