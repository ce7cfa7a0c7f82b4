//! Cooperative context switch between kernel threads.
//!
//! Only the callee-saved registers (x19-x30) and the stack pointer need to
//! cross a `context_switch` call per AAPCS64 -- everything else is the
//! caller's to save if it cares. [`crate::sched::task::Context`] mirrors
//! this register set exactly.

use core::arch::{asm, global_asm};

use crate::sched::task::Context;

global_asm!(
    r#"
    .global context_switch
    .global thread_trampoline

context_switch:
    // x0 = &mut prev_ctx, x1 = &next_ctx
    mov x9, sp
    stp x19, x20, [x0, #0]
    stp x21, x22, [x0, #16]
    stp x23, x24, [x0, #32]
    stp x25, x26, [x0, #48]
    stp x27, x28, [x0, #64]
    stp x29, x30, [x0, #80]
    str x9,  [x0, #96]

    ldp x19, x20, [x1, #0]
    ldp x21, x22, [x1, #16]
    ldp x23, x24, [x1, #32]
    ldp x25, x26, [x1, #48]
    ldp x27, x28, [x1, #64]
    ldp x29, x30, [x1, #80]
    ldr x9,  [x1, #96]
    mov sp, x9
    ret

thread_trampoline:
    // x19 = entry fn, x20 = arg, set up by Thread::new()
    mov x0, x20
    blr x19
    b sched_on_thread_exit_trampoline
"#
);

extern "C" {
    pub fn context_switch(prev: *mut Context, next: *mut Context);
}

#[no_mangle]
extern "C" fn sched_on_thread_exit_trampoline() -> ! {
    crate::sched::on_thread_exit()
}

/// Enables EL1 access to the FPU/NEON register file. Called once from boot
/// before any floating point code runs (the virtio and syscall paths don't
/// use it today, but `core::fmt` formatting of some primitive types can).
pub fn init_fpu() {
    // SAFETY: CPACR_EL1 is writable from EL1; setting FPEN=0b11 disables
    // the trap on FP/SIMD instructions without altering any other field
    // we rely on.
    unsafe {
        asm!(
            "mrs x9, CPACR_EL1",
            "orr x9, x9, #(0x3 << 20)",
            "msr CPACR_EL1, x9",
            "isb",
            out("x9") _,
        );
    }
}

pub fn current_el() -> u8 {
    // SAFETY: CurrentEL is readable from any exception level.
    let el: u64;
    unsafe {
        asm!("mrs {}, CurrentEL", out(reg) el);
    }
    ((el >> 2) & 0x3) as u8
}
