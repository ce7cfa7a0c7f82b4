#![no_std]
#![no_main]

use core::panic::PanicInfo;

#[macro_use]
mod print;

#[path = "arch/aarch64/boot.rs"]
mod boot;
mod arch;
mod drivers;
mod error;
mod irq;
mod mm;
mod sched;
mod sync;
mod syscall;
mod user_task;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("{info}");
    arch::aarch64::halt();
}

/// Entered from `boot::_start_rust` on the boot stack, MMU off, BSS
/// already cleared.
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    print::init_logger();
    log::info!("booting");

    let kernel_end = {
        extern "C" {
            static __kernel_end: u8;
        }
        // SAFETY: `__kernel_end` is a linker-provided symbol, not a real
        // object; only its address is used.
        unsafe { &__kernel_end as *const u8 as usize }
    };

    mm::init(kernel_end).expect("mm::init");
    log::info!(
        "paging enabled, {} frames free",
        mm::FRAME_ALLOCATOR.lock().free_frames()
    );

    arch::aarch64::gic::init().expect("gic::init");
    arch::aarch64::timer::init_100hz();
    arch::aarch64::gic::enable_irq(arch::aarch64::timer::TIMER_PPI).expect("enable timer irq");

    sched::init();
    // SAFETY: unmasking IRQs at EL1 now that the vector table, GIC, and
    // scheduler are all initialized.
    unsafe {
        core::arch::asm!("msr daifclr, #2");
    }

    match sched::usersched::init(user_task::blob()) {
        Ok(()) => {
            log::info!("entering user tasks A/B");
            sched::usersched::start_ab();
        }
        Err(e) => {
            log::warn!("usersched::init failed ({e}), staying in kernel mode");
            sched::start();
        }
    }
}
