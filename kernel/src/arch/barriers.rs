//! Memory barrier primitives.
//!
//! These back two uses: paging's TLB-invalidate sequences (§4.2, full
//! `dsb`+`isb`) and the virtio core's descriptor/ring ordering (§4.5,
//! inner-shareable `dmb` pairs around publishing `avail.idx` and reading
//! `used.idx`).

/// Full system data synchronization barrier followed by an instruction
/// barrier. Used after TLB invalidation and MMU/cache enable sequences.
#[inline(always)]
pub fn data_sync_barrier() {
    // SAFETY: `dsb sy` + `isb` is the standard AArch64 pattern for making a
    // preceding store (e.g. TTBR0_EL1, a TLBI) visible before the next
    // instruction fetch. No side effects beyond ordering.
    unsafe {
        core::arch::asm!("dsb sy", "isb", options(nostack, preserves_flags));
    }
}

/// Inner-shareable store-store barrier: orders a descriptor fill before
/// publishing its index in the available ring (spec §4.5).
#[inline(always)]
pub fn dma_store_barrier() {
    // SAFETY: `dmb ishst` orders stores only, inner-shareable domain, which
    // matches the single-core-plus-DMA-observer coherence model in §5.
    unsafe {
        core::arch::asm!("dmb ishst", options(nostack, preserves_flags));
    }
}

/// Inner-shareable full barrier: used between publishing `avail.idx` and
/// writing the notify register, and before reading `used.idx`.
#[inline(always)]
pub fn dma_full_barrier() {
    // SAFETY: `dmb ish` orders all prior loads/stores against all subsequent
    // ones, inner-shareable domain.
    unsafe {
        core::arch::asm!("dmb ish", options(nostack, preserves_flags));
    }
}
