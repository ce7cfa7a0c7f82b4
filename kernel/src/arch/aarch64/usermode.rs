//! EL1 -> EL0 transition.

use core::arch::asm;

/// Transfers control to EL0 via `eret`. `arg0` lands in x0 for the entry
/// function. Never returns -- re-entry into EL1 happens only through the
/// exception path (SVC, IRQ, or fault), never by this function returning.
///
/// # Safety
/// `entry` and `user_stack` must be mapped user-accessible (AP[1]=1) and
/// executable/writable respectively in the page tables currently active via
/// TTBR0_EL1, and VBAR_EL1 must already point at the installed vector table.
pub unsafe fn enter_usermode(entry: u64, user_stack: u64, arg0: u64) -> ! {
    // SAFETY: forwarded from caller.
    unsafe {
        asm!(
            "msr SPSR_EL1, {spsr}",
            "msr ELR_EL1, {entry}",
            "msr SP_EL0, {stack}",
            "isb",
            "eret",
            spsr = in(reg) 0u64,
            entry = in(reg) entry,
            stack = in(reg) user_stack,
            in("x0") arg0,
            options(noreturn)
        );
    }
}
