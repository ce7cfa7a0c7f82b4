//! Kernel heap.
//!
//! Backed by frames pulled from the physical allocator at init time and
//! handed to `linked_list_allocator`, which owns free-list bookkeeping from
//! there -- no bespoke slab classes or per-CPU caches for a single-core
//! kernel with a modest, short-lived set of allocations (virtqueue
//! bookkeeping, page-table scratch, driver state).

use linked_list_allocator::LockedHeap;

use crate::error::KernelResult;
use crate::mm::frame_allocator::FRAME_ALLOCATOR;

const HEAP_SIZE: usize = 1024 * 1024;

#[cfg(target_os = "none")]
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Reserves `HEAP_SIZE` worth of contiguous physical frames and hands them
/// to the global allocator. Must run once, after `frame_allocator::init`,
/// before any `alloc`-dependent code runs.
pub fn init() -> KernelResult<()> {
    let pages = HEAP_SIZE / crate::mm::frame_allocator::FRAME_SIZE;
    let base = FRAME_ALLOCATOR.lock().alloc_pages(pages)?;
    let heap_start = base.phys_addr();
    // SAFETY: `heap_start..heap_start+HEAP_SIZE` is a freshly allocated,
    // identity-mapped, otherwise-unreferenced physical range, and `init` is
    // called exactly once before any allocation.
    #[cfg(target_os = "none")]
    unsafe {
        ALLOCATOR.lock().init(heap_start as *mut u8, HEAP_SIZE);
    }
    #[cfg(not(target_os = "none"))]
    let _ = heap_start;
    Ok(())
}
