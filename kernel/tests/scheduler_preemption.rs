//! Registers two kernel threads that never yield and confirms the 100 Hz
//! timer preempts between them -- both loop counters must be observed
//! greater than zero, which is only possible if the timer IRQ path forced
//! a context switch away from whichever thread is spinning.
//!
//! Requires a booted image under QEMU; not part of the default `cargo
//! test` harness.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU64, Ordering};

use qemu_exit::QEMUExit;

#[path = "../src/arch/aarch64/boot.rs"]
mod boot;

use ignis_kernel::sched::{self, task::Thread};

static COUNTER_A: AtomicU64 = AtomicU64::new(0);
static COUNTER_B: AtomicU64 = AtomicU64::new(0);

const STACK_SIZE: usize = 16 * 1024;
static mut STACK_A: [u8; STACK_SIZE] = [0; STACK_SIZE];
static mut STACK_B: [u8; STACK_SIZE] = [0; STACK_SIZE];

fn qemu_exit() -> qemu_exit::AArch64 {
    qemu_exit::AArch64::new()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    ignis_kernel::println!("scheduler_preemption FAILED: {info}");
    qemu_exit().exit_failure()
}

extern "C" fn spin_forever(counter: usize) {
    let counter = unsafe { &*(counter as *const AtomicU64) };
    loop {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spins long enough for the 100 Hz tick to have preempted it many times
/// over, then checks that the other thread made progress too, and exits.
extern "C" fn judge(_arg: usize) {
    while COUNTER_B.load(Ordering::Relaxed) < 200 {
        COUNTER_B.fetch_add(1, Ordering::Relaxed);
        core::hint::spin_loop();
    }

    let a = COUNTER_A.load(Ordering::Relaxed);
    let b = COUNTER_B.load(Ordering::Relaxed);
    ignis_kernel::println!("scheduler_preemption: a={a} b={b}");

    assert!(a > 0, "thread A never ran -- no preemption occurred");
    assert!(b > 0, "thread B never ran");
    qemu_exit().exit_success()
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
    ignis_kernel::mm::init(kernel_end).expect("mm::init");

    ignis_kernel::arch::aarch64::gic::init().expect("gic::init");
    ignis_kernel::arch::aarch64::timer::init_100hz();
    ignis_kernel::arch::aarch64::gic::enable_irq(ignis_kernel::arch::aarch64::timer::TIMER_PPI)
        .expect("enable timer irq");

    sched::init();

    // SAFETY: these statics are only ever touched by the two threads built
    // below, each given exclusive ownership of its own stack slice.
    let (stack_a, stack_b) = unsafe { (&mut *&raw mut STACK_A, &mut *&raw mut STACK_B) };

    sched::add(Thread::new(
        1,
        spin_forever,
        &COUNTER_A as *const AtomicU64 as usize,
        stack_a,
    ));
    sched::add(Thread::new(2, judge, 0, stack_b));

    // SAFETY: vector table, GIC, and scheduler are all initialized.
    unsafe {
        core::arch::asm!("msr daifclr, #2");
    }

    sched::start()
}
