//! SVC syscall dispatch.
//!
//! Three calls: write(64), exit(93), yield(124). Syscall number comes from
//! trap-frame register 8, arguments from registers 0-2, matching the AAPCS64
//! convention the user blobs are compiled against.

use crate::arch::aarch64::trapframe::TrapFrame;

const SYS_WRITE: u64 = 64;
const SYS_EXIT: u64 = 93;
const SYS_YIELD: u64 = 124;

/// Dispatches one SVC trap. Returns the trap frame, ELR, and SP_EL0 to
/// resume with -- `yield`/`exit` may hand back a different user task's
/// saved frame and stack pointer when the user scheduler is active.
pub fn handle_svc(frame: &TrapFrame, elr: u64, sp_el0: u64) -> (TrapFrame, u64, u64) {
    let no = frame.reg(8);
    match no {
        SYS_WRITE => {
            let ptr = frame.reg(0);
            let len = frame.reg(2);
            // SAFETY: the trap came from EL0, whose only mapped code/data
            // lives in the fixed demo blob pages; `len` is bounded by the
            // blob's own buffer size in practice. A hostile or buggy
            // userspace could pass a bad pointer -- there is no further
            // validation in scope for this kernel's single-purpose blobs.
            let bytes = unsafe { core::slice::from_raw_parts(ptr as *const u8, len as usize) };
            for &b in bytes {
                crate::print!("{}", b as char);
            }
            let mut out = *frame;
            out.set_reg(0, len);
            (out, elr + 4, sp_el0)
        }
        SYS_EXIT => {
            if crate::sched::usersched::is_active() {
                match crate::sched::usersched::on_exit(sp_el0) {
                    Some((next_frame, next_elr, next_sp_el0)) => (next_frame, next_elr, next_sp_el0),
                    None => {
                        log::info!("last user task exited, halting");
                        crate::arch::aarch64::halt()
                    }
                }
            } else {
                crate::sched::on_thread_exit()
            }
        }
        SYS_YIELD => {
            if crate::sched::usersched::is_active() {
                crate::sched::usersched::on_yield(frame, elr, sp_el0)
            } else {
                crate::sched::yield_now();
                let mut out = *frame;
                out.set_reg(0, 0);
                (out, elr + 4, sp_el0)
            }
        }
        _ => {
            let mut out = *frame;
            out.set_reg(0, !0u64);
            (out, elr + 4, sp_el0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_syscall_sets_minus_one_and_advances() {
        let mut frame = TrapFrame::default();
        frame.set_reg(8, 9999);
        let (out, elr, sp_el0) = handle_svc(&frame, 0x1000, 0x2000);
        assert_eq!(out.reg(0), u64::MAX);
        assert_eq!(elr, 0x1004);
        assert_eq!(sp_el0, 0x2000);
    }
}
