//! Early boot entry, reached from `boot.S` after the assembly stub has set
//! up the stack pointer and is still running with the MMU off.
//!
//! Pulled into the root of whichever binary crate needs to be a bootable
//! image (the `ignis-kernel` binary, and each `tests/` integration target)
//! via `#[path = "arch/aarch64/boot.rs"] mod boot;` rather than through the
//! shared `arch` module tree, so that exactly one object in the link
//! defines `_start`. The exception vector table rides along with it for
//! the same reason.

use core::arch::global_asm;

global_asm!(include_str!("boot.S"));
global_asm!(include_str!("vectors.S"));

#[no_mangle]
#[link_section = ".text.boot"]
pub extern "C" fn _start_rust() -> ! {
    extern "C" {
        static mut __bss_start: u8;
        static mut __bss_end: u8;
    }

    // SAFETY: `__bss_start`/`__bss_end` are linker-provided symbols
    // bracketing the image's BSS, which no other code has touched yet.
    unsafe {
        let bss_start = &raw mut __bss_start;
        let bss_end = &raw const __bss_end as *const u8;
        let bss_size = bss_end as usize - bss_start as usize;
        core::ptr::write_bytes(bss_start, 0, bss_size);
    }

    crate::kernel_main()
}
