//! Library crate backing the `ignis-kernel` binary and its host-side unit
//! tests. The bare-metal binary target (`main.rs`) owns `_start` and the
//! panic handler; this crate exists so the `#[cfg(test)]` modules scattered
//! across the tree can run on the host with the standard `cargo test`
//! harness.

#![no_std]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]

extern crate alloc;

#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod error;
pub mod irq;
pub mod mm;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("heap allocation failed: {layout:?}");
}
