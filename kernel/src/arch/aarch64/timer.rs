//! Architected generic timer driver, configured for a 100 Hz tick.

use core::arch::asm;
use core::sync::atomic::{AtomicU64, Ordering};

pub const TIMER_PPI: u32 = 30;

static TICKS: AtomicU64 = AtomicU64::new(0);
static RELOAD: AtomicU64 = AtomicU64::new(0);

pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Reads `CNTFRQ_EL0`, derives the reload value for a 100 Hz period, and
/// arms `CNTP_TVAL_EL0`/`CNTP_CTL_EL0`. The GIC-side enable for PPI 30 is
/// the caller's responsibility (see `main::kernel_main`).
pub fn init_100hz() {
    let cntfrq: u64;
    // SAFETY: CNTFRQ_EL0 is readable from EL1 and reports the counter
    // frequency programmed by firmware; no side effects.
    unsafe {
        asm!("mrs {}, CNTFRQ_EL0", out(reg) cntfrq);
    }
    let reload = cntfrq / 100;
    RELOAD.store(reload, Ordering::Relaxed);
    arm(reload);
}

fn arm(reload: u64) {
    // SAFETY: CNTP_TVAL_EL0/CNTP_CTL_EL0 are EL1-writable timer control
    // registers; writing them only affects this timer's countdown and
    // enable bit.
    unsafe {
        asm!("msr CNTP_TVAL_EL0, {}", in(reg) reload);
        asm!("msr CNTP_CTL_EL0, {}", in(reg) 1u64);
    }
}

/// Called from the IRQ dispatch path on PPI 30. Reloads the timer and
/// advances the tick count; every 50th tick (0.5s) prints a heartbeat dot so
/// a human watching the console can see interrupts are actually flowing.
pub fn on_irq() {
    arm(RELOAD.load(Ordering::Relaxed));
    let ticks = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if ticks % 50 == 0 {
        crate::print!(".");
    }
}
