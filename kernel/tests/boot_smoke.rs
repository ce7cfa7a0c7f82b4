//! Boots the kernel image far enough to bring up paging and confirms the
//! frame allocator survives the reservation of the kernel's own image and
//! the heap arena with pages to spare.
//!
//! Requires a booted image under QEMU (run via the `aarch64-unknown-none`
//! runner in `.cargo/config.toml`); not part of the default `cargo test`
//! harness.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use qemu_exit::QEMUExit;

#[path = "../src/arch/aarch64/boot.rs"]
mod boot;

fn qemu_exit() -> qemu_exit::AArch64 {
    qemu_exit::AArch64::new()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    ignis_kernel::println!("boot_smoke FAILED: {info}");
    qemu_exit().exit_failure()
}

#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    ignis_kernel::print::init_logger();

    let kernel_end = {
        extern "C" {
            static __kernel_end: u8;
        }
        // SAFETY: linker-provided bound of the loaded image.
        unsafe { &__kernel_end as *const u8 as usize }
    };

    ignis_kernel::mm::init(kernel_end).expect("mm::init must succeed on a fresh boot");

    let free = ignis_kernel::mm::FRAME_ALLOCATOR.lock().free_frames();
    assert!(
        free > 0,
        "frame allocator reports no free frames after reserving the kernel image and heap"
    );

    ignis_kernel::println!("boot_smoke OK, {free} frames free");
    qemu_exit().exit_success()
}
