//! Memory management: physical frames, 4-level translation tables, demand
//! paging, and the kernel heap.

pub mod demand_paging;
pub mod frame_allocator;
pub mod heap;
pub mod page_table;

use core::cell::UnsafeCell;

pub use frame_allocator::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};
pub use page_table::PageFlags;

use crate::error::KernelResult;
use page_table::AddressSpace;

struct SpaceCell(UnsafeCell<Option<AddressSpace>>);

// SAFETY: reached only during single-threaded init and afterwards from
// contexts with interrupts masked, same discipline as the scheduler.
unsafe impl Sync for SpaceCell {}

static KERNEL_SPACE: SpaceCell = SpaceCell(UnsafeCell::new(None));

pub fn with_kernel_space<R>(f: impl FnOnce(&mut AddressSpace) -> R) -> R {
    // SAFETY: see `SpaceCell`'s invariant; `init` has already run by the
    // time anything calls this.
    let space = unsafe { (*KERNEL_SPACE.0.get()).as_mut() }
        .expect("mm::with_kernel_space before mm::init");
    f(space)
}

/// Allocates a frame and maps it at `va`, returning the physical address.
pub fn alloc_and_map(va: usize, flags: PageFlags) -> KernelResult<usize> {
    let frame = FRAME_ALLOCATOR.lock().alloc_page()?;
    let pa = frame.phys_addr();
    with_kernel_space(|space| space.map_page(va, pa, flags))?;
    Ok(pa)
}

/// Makes newly written instructions at `[va, va+len)` visible to the
/// instruction stream: clean each data cache line containing the range to
/// the point of unification, then invalidate the matching instruction
/// cache lines, per the ARMv8 software requirement for self-modifying or
/// freshly loaded code.
pub fn icache_sync(va: usize, len: usize) {
    const CACHE_LINE: usize = 64;
    let start = va & !(CACHE_LINE - 1);
    let end = (va + len + CACHE_LINE - 1) & !(CACHE_LINE - 1);
    let mut addr = start;
    while addr < end {
        // SAFETY: `addr` lies within the just-written `[va, va+len)` range,
        // which the caller guarantees is mapped.
        unsafe {
            core::arch::asm!("dc cvau, {0}", in(reg) addr, options(nostack, preserves_flags));
        }
        addr += CACHE_LINE;
    }
    crate::arch::barriers::data_sync_barrier();
    addr = start;
    while addr < end {
        // SAFETY: same range as above, now clean to the point of
        // unification.
        unsafe {
            core::arch::asm!("ic ivau, {0}", in(reg) addr, options(nostack, preserves_flags));
        }
        addr += CACHE_LINE;
    }
    crate::arch::barriers::data_sync_barrier();
}

/// Identity-maps RAM and the platform's fixed MMIO windows, builds the
/// kernel's TTBR0_EL1 table, and enables the MMU. `kernel_end` marks the
/// top of the statically linked kernel image so the frame allocator can
/// reserve everything below it.
pub fn init(kernel_end: usize) -> KernelResult<()> {
    FRAME_ALLOCATOR.lock().mark_used_range(kernel_end);

    let mut space = AddressSpace::new()?;

    // Identity-map RAM as normal, cacheable memory.
    let ram_base = frame_allocator::RAM_BASE;
    let ram_pages = frame_allocator::RAM_SIZE / FRAME_SIZE;
    for i in 0..ram_pages {
        let va = ram_base + i * FRAME_SIZE;
        // Pages already consumed by `mark_used_range`'s reservation are
        // still identity-mapped here; they are simply never handed out by
        // the frame allocator again.
        let _ = space.map_page(va, va, PageFlags::READWRITE);
    }

    // Platform MMIO windows: PL011 UART, GICv2 distributor + CPU interface,
    // and the ECAM PCI configuration window.
    for (base, size) in [
        (0x0900_0000usize, 0x1000usize),
        (0x0800_0000, 0x1000),
        (0x0801_0000, 0x1000),
        (0x1000_0000, 0x1000_0000),
        (0x4010_0000_0000, 256 * 1024 * 1024),
    ] {
        let pages = size / FRAME_SIZE;
        for i in 0..pages {
            let va = base + i * FRAME_SIZE;
            let _ = space.map_page(va, va, PageFlags::READWRITE | PageFlags::DEVICE);
        }
    }

    // SAFETY: `init` runs once during early boot before any other code
    // depends on virtual memory being active; `mair`/`tcr` describe the two
    // memory types the mappings above actually use.
    unsafe {
        activate(&space);
    }

    // SAFETY: single-threaded init, no prior writer.
    unsafe {
        *KERNEL_SPACE.0.get() = Some(space);
    }

    heap::init()?;
    Ok(())
}

/// Programs MAIR_EL1/TCR_EL1/TTBR0_EL1 and enables the MMU plus the data
/// and instruction caches (SCTLR_EL1.M/C/I).
///
/// # Safety
/// Every VA the currently executing code and stack depend on must already
/// be mapped by `space`'s root table (true here because RAM is identity
/// mapped in full before this is called).
unsafe fn activate(space: &AddressSpace) {
    const MAIR: u64 = 0x00_04_FF; // index 0: Normal WB/WA, index 1: Device-nGnRE
    const T0SZ: u64 = 25; // 39-bit VA space, matching the 4-level walk above
    const TCR: u64 = T0SZ | (0b00 << 14) /* 4KiB granule */ | (0b01 << 8) /* IRGN WBWA */
        | (0b01 << 10) /* ORGN WBWA */ | (0b10 << 12) /* SH inner */;

    // SAFETY: forwarded from caller.
    unsafe {
        core::arch::asm!(
            "msr MAIR_EL1, {mair}",
            "msr TCR_EL1, {tcr}",
            "msr TTBR0_EL1, {ttbr0}",
            "isb",
            "mrs {tmp}, SCTLR_EL1",
            "orr {tmp}, {tmp}, #1",      // M
            "orr {tmp}, {tmp}, #4",      // C
            "orr {tmp}, {tmp}, #0x1000", // I
            "msr SCTLR_EL1, {tmp}",
            "isb",
            mair = in(reg) MAIR,
            tcr = in(reg) TCR,
            ttbr0 = in(reg) space.root_phys() as u64,
            tmp = out(reg) _,
        );
    }
}
