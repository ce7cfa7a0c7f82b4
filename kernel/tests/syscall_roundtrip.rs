//! Drives the SVC dispatch table directly with a synthesized trap frame,
//! the way `vectors.S` would hand one to `exception_dispatch` on a real
//! trap, and checks the write(64) contract: the console receives the
//! bytes, x0 comes back with the length written, and the returned ELR is
//! the instruction after the `svc`.
//!
//! Requires a booted image under QEMU; not part of the default `cargo
//! test` harness.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use qemu_exit::QEMUExit;

#[path = "../src/arch/aarch64/boot.rs"]
mod boot;

use ignis_kernel::arch::aarch64::trapframe::TrapFrame;
use ignis_kernel::syscall;

const SYS_WRITE: u64 = 64;

fn qemu_exit() -> qemu_exit::AArch64 {
    qemu_exit::AArch64::new()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    ignis_kernel::println!("syscall_roundtrip FAILED: {info}");
    qemu_exit().exit_failure()
}

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    ignis_kernel::print::init_logger();

    static MESSAGE: &[u8] = b"Hello";

    let mut frame = TrapFrame::default();
    frame.set_reg(8, SYS_WRITE);
    frame.set_reg(0, MESSAGE.as_ptr() as u64);
    frame.set_reg(2, MESSAGE.len() as u64);

    let entry_elr = 0x4008_1000u64;
    let entry_sp_el0 = 0x3000_0000u64;
    let (out, next_elr, next_sp_el0) = syscall::handle_svc(&frame, entry_elr, entry_sp_el0);

    assert_eq!(
        out.reg(0),
        MESSAGE.len() as u64,
        "write syscall must return the byte count in x0"
    );
    assert_eq!(
        next_elr,
        entry_elr + 4,
        "write syscall must resume at the instruction after the svc"
    );
    assert_eq!(
        next_sp_el0, entry_sp_el0,
        "write syscall must not touch the caller's stack pointer"
    );

    ignis_kernel::println!("syscall_roundtrip OK");
    qemu_exit().exit_success()
}
