//! Exception dispatch, called from `vectors.S` for every trap.
//!
//! `vector_common` hands us the vector id (0-15, matching the ARM vector
//! table layout: four groups of four -- sync/irq/fiq/serror -- for
//! curr_el_sp0, curr_el_spx, lower_el_aarch64, lower_el_aarch32), the
//! syndrome registers, a pointer to the trap frame it just built on the
//! exception stack, and the trapped task's SP_EL0. We may rewrite that
//! frame in place (for a context switch) and always return the ELR_EL1 and
//! SP_EL0 values the epilogue should resume with -- a yield between user
//! tasks hands back the peer's saved stack pointer along with its frame.

use super::trapframe::TrapFrame;

const VEC_SP0_SYNC: u64 = 0;
const VEC_SP0_IRQ: u64 = 1;
const VEC_SP0_FIQ: u64 = 2;
const VEC_SP0_SERROR: u64 = 3;
const VEC_SPX_SYNC: u64 = 4;
const VEC_SPX_IRQ: u64 = 5;
const VEC_SPX_FIQ: u64 = 6;
const VEC_SPX_SERROR: u64 = 7;
const VEC_EL0_64_SYNC: u64 = 8;
const VEC_EL0_64_IRQ: u64 = 9;
const VEC_EL0_64_FIQ: u64 = 10;
const VEC_EL0_64_SERROR: u64 = 11;
const VEC_EL0_32_SYNC: u64 = 12;
const VEC_EL0_32_IRQ: u64 = 13;
const VEC_EL0_32_FIQ: u64 = 14;
const VEC_EL0_32_SERROR: u64 = 15;

const EC_SVC64: u64 = 0x15;
const EC_IABORT_LOWER: u64 = 0x20;
const EC_IABORT_SAME: u64 = 0x21;
const EC_DABORT_LOWER: u64 = 0x24;
const EC_DABORT_SAME: u64 = 0x25;

fn esr_ec(esr: u64) -> u64 {
    (esr >> 26) & 0x3f
}

/// Data/instruction fault status code, low 6 bits of ISS for abort classes.
fn esr_dfsc(esr: u64) -> u64 {
    esr & 0x3f
}

/// Translation-fault DFSC encodings share bits [5:2] == 0b0001, with
/// bits [1:0] carrying the level (0-3) at which the walk stopped. Spec
/// §4.2 speaks of "a translation fault" generally, not just leaf-level
/// ones, so this matches any level rather than only L3.
fn is_translation_fault(dfsc: u64) -> bool {
    dfsc & 0b11_1100 == 0b00_0100
}

/// `ELR_EL1`/`SP_EL0` pair the `vector_common` epilogue restores before
/// `eret` -- returned by value in x0/x1 per AAPCS64's rules for a
/// two-word integer aggregate.
#[repr(C)]
struct Resume {
    elr: u64,
    sp_el0: u64,
}

#[no_mangle]
extern "C" fn exception_dispatch(
    vecid: u64,
    esr: u64,
    elr: u64,
    far: u64,
    frame: *mut TrapFrame,
    sp_el0: u64,
) -> Resume {
    // SAFETY: `vector_common` always passes a pointer to the frame it just
    // built on the exception stack, live for the duration of this call.
    let frame_ref = unsafe { &mut *frame };

    match vecid {
        VEC_SP0_IRQ | VEC_SPX_IRQ | VEC_EL0_64_IRQ => {
            let (next_frame, next_elr) = crate::irq::handle(frame_ref, elr);
            *frame_ref = next_frame;
            Resume { elr: next_elr, sp_el0 }
        }
        VEC_SP0_SYNC | VEC_SPX_SYNC | VEC_EL0_64_SYNC => {
            handle_sync(vecid, esr, elr, far, frame_ref, sp_el0)
        }
        VEC_SP0_FIQ | VEC_SPX_FIQ | VEC_EL0_64_FIQ => {
            fatal("unexpected FIQ", vecid, esr, elr, far, frame_ref)
        }
        VEC_SP0_SERROR | VEC_SPX_SERROR | VEC_EL0_64_SERROR => {
            fatal("SError", vecid, esr, elr, far, frame_ref)
        }
        VEC_EL0_32_SYNC | VEC_EL0_32_IRQ | VEC_EL0_32_FIQ | VEC_EL0_32_SERROR => {
            fatal("aarch32 trap on an aarch64-only platform", vecid, esr, elr, far, frame_ref)
        }
        _ => fatal("unknown vector id", vecid, esr, elr, far, frame_ref),
    }
}

fn handle_sync(
    vecid: u64,
    esr: u64,
    elr: u64,
    far: u64,
    frame: &mut TrapFrame,
    sp_el0: u64,
) -> Resume {
    match esr_ec(esr) {
        EC_SVC64 => {
            let (next_frame, next_elr, next_sp_el0) = crate::syscall::handle_svc(frame, elr, sp_el0);
            *frame = next_frame;
            Resume { elr: next_elr, sp_el0: next_sp_el0 }
        }
        EC_IABORT_LOWER | EC_IABORT_SAME | EC_DABORT_LOWER | EC_DABORT_SAME => {
            let far = far as usize;
            if is_translation_fault(esr_dfsc(esr)) && crate::mm::demand_paging::in_demand_region(far) {
                match crate::mm::demand_paging::handle_fault(far) {
                    Ok(()) => Resume { elr, sp_el0 },
                    Err(e) => fatal_msg("demand paging failed", vecid, esr, elr, far as u64, frame, e),
                }
            } else {
                fatal("unhandled page fault outside the demand-paging window", vecid, esr, elr, far as u64, frame)
            }
        }
        _ => fatal("unhandled synchronous exception", vecid, esr, elr, far, frame),
    }
}

fn fatal(reason: &str, vecid: u64, esr: u64, elr: u64, far: u64, frame: &TrapFrame) -> ! {
    log::error!("fatal exception: {reason}");
    log::error!("vector={vecid} esr={esr:#x} elr={elr:#x} far={far:#x}");
    log::error!(
        "x0={:#x} x1={:#x} x2={:#x} x8={:#x} x30={:#x}",
        frame.reg(0),
        frame.reg(1),
        frame.reg(2),
        frame.reg(8),
        frame.reg(30),
    );
    panic!("{reason}");
}

fn fatal_msg(
    reason: &str,
    vecid: u64,
    esr: u64,
    elr: u64,
    far: u64,
    frame: &TrapFrame,
    err: crate::error::KernelError,
) -> ! {
    log::error!("{reason}: {err:?}");
    fatal(reason, vecid, esr, elr, far, frame)
}
