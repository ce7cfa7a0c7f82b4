//! Lazy page population for the demand region.
//!
//! A translation fault whose faulting address falls inside
//! `[DEMAND_BASE, DEMAND_BASE + DEMAND_SIZE)` is not fatal: the fault
//! handler hands back a fresh zeroed frame and the faulting instruction is
//! retried. Anything outside that window is a real programming error and
//! falls through to the panic path in `exception.rs`.

use crate::error::KernelResult;
use crate::mm::page_table::PageFlags;

pub const DEMAND_BASE: usize = 0x6000_0000;
pub const DEMAND_SIZE: usize = 0x1000_0000;

pub fn in_demand_region(va: usize) -> bool {
    va >= DEMAND_BASE && va < DEMAND_BASE + DEMAND_SIZE
}

/// Installs a fresh zeroed frame at `va`, page-aligning down first. Returns
/// an error only if the frame allocator itself is exhausted -- that case is
/// treated as fatal by the caller, since a demand fault with no memory left
/// has no valid retry.
pub fn handle_fault(va: usize) -> KernelResult<()> {
    let page_va = va & !0xfff;
    let frame = crate::mm::frame_allocator::FRAME_ALLOCATOR
        .lock()
        .alloc_page()?;
    let pa = frame.phys_addr();
    // SAFETY: `pa` was just allocated and is not yet mapped or aliased.
    unsafe {
        core::ptr::write_bytes(pa as *mut u8, 0, 4096);
    }
    crate::mm::with_kernel_space(|space| {
        space.map_page(page_va, pa, PageFlags::READWRITE | PageFlags::NOEXEC)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_bounds_are_exclusive_at_top() {
        assert!(in_demand_region(DEMAND_BASE));
        assert!(in_demand_region(DEMAND_BASE + DEMAND_SIZE - 1));
        assert!(!in_demand_region(DEMAND_BASE + DEMAND_SIZE));
        assert!(!in_demand_region(DEMAND_BASE - 1));
    }
}
