//! 4-level AArch64 translation tables (4 KiB granule).
//!
//! Virtual addresses are split into four 9-bit table indices plus a 12-bit
//! page offset: `[L0:9][L1:9][L2:9][L3:9][offset:12]`. This kernel only
//! populates TTBR0_EL1 -- there is no separate kernel/user table root split
//! beyond the per-entry AP[1] (USER) bit, since every mapping this kernel
//! makes lives in the same identity-mapped physical window.

use core::ops::{Index, IndexMut};

use crate::error::{KernelError, KernelResult};
use crate::mm::frame_allocator::FRAME_ALLOCATOR;

pub const ENTRIES: usize = 512;

bitflags::bitflags! {
    /// Lower attribute bits of a stage-1 leaf descriptor (bits [11:2] plus
    /// the valid/table bits handled separately by `PageTableEntry::set`).
    /// AP[2] (bit 7, read-only) is never set -- every mapping this kernel
    /// makes is writable; there is no read-only/COW support in scope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        /// No-op marker: every leaf is writable by default. Kept so call
        /// sites can spell out intent (`READWRITE | USER`) even though it
        /// contributes no bits of its own.
        const READWRITE = 0;
        /// MAIR index 1 (Device-nGnRE) instead of index 0 (Normal WB).
        const DEVICE    = 1 << 2;
        /// UXN: never execute at EL0.
        const NOEXEC    = 1 << 54;
        /// AP[1] = 1: accessible from EL0, not just EL1.
        const USER      = 1 << 6;
    }
}

const VALID: u64 = 1 << 0;
const TABLE_OR_PAGE: u64 = 1 << 1;
const AF: u64 = 1 << 10;
const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_valid(&self) -> bool {
        self.0 & VALID != 0
    }

    fn set_table(&mut self, table_phys: usize) {
        self.0 = table_phys as u64 & ADDR_MASK | VALID | TABLE_OR_PAGE;
    }

    fn set_leaf(&mut self, phys: usize, flags: PageFlags) {
        self.0 = phys as u64 & ADDR_MASK | VALID | TABLE_OR_PAGE | AF | flags.bits();
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); ENTRIES],
        }
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;
    fn index(&self, i: usize) -> &PageTableEntry {
        &self.entries[i]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, i: usize) -> &mut PageTableEntry {
        &mut self.entries[i]
    }
}

fn indices(va: usize) -> [usize; 4] {
    [
        (va >> 39) & 0x1ff,
        (va >> 30) & 0x1ff,
        (va >> 21) & 0x1ff,
        (va >> 12) & 0x1ff,
    ]
}

/// Root-level table walker. Allocates intermediate tables from the frame
/// allocator on demand; every PA used for a page table is identity-mapped,
/// since this kernel never enables a separate physical-memory offset.
pub struct AddressSpace {
    root: *mut PageTable,
}

// SAFETY: exclusive access is enforced by single-core + interrupt-masked
// discipline at call sites, same as the rest of the memory subsystem.
unsafe impl Send for AddressSpace {}

impl AddressSpace {
    pub fn new() -> KernelResult<Self> {
        let frame = FRAME_ALLOCATOR.lock().alloc_page()?;
        let root = frame.phys_addr() as *mut PageTable;
        // SAFETY: `root` is freshly allocated, 4 KiB aligned, and not yet
        // referenced by TTBR0_EL1.
        unsafe {
            root.write(PageTable::new());
        }
        Ok(Self { root })
    }

    pub fn root_phys(&self) -> usize {
        self.root as usize
    }

    fn table_mut(&mut self, table_phys: usize) -> &'static mut PageTable {
        // SAFETY: `table_phys` always comes from either `self.root` or a
        // descriptor this walker wrote itself, pointing at a
        // PageTable-sized, PageTable-aligned identity-mapped frame.
        unsafe { &mut *(table_phys as *mut PageTable) }
    }

    fn next_level(&mut self, table_phys: usize, idx: usize) -> KernelResult<usize> {
        let table = self.table_mut(table_phys);
        if table[idx].is_valid() {
            return Ok((table[idx].0 & ADDR_MASK) as usize);
        }
        let frame = FRAME_ALLOCATOR.lock().alloc_page()?;
        let child_phys = frame.phys_addr();
        // SAFETY: freshly allocated frame, not yet aliased.
        unsafe {
            (child_phys as *mut PageTable).write(PageTable::new());
        }
        table[idx].set_table(child_phys);
        Ok(child_phys)
    }

    /// Same walk as `next_level`, but never allocates: a missing
    /// intermediate table means the VA isn't mapped, full stop. Used by
    /// queries and by unmap, which must not install tables just to
    /// discover there's nothing there.
    fn next_level_readonly(&self, table_phys: usize, idx: usize) -> Option<usize> {
        // SAFETY: same as `table_mut` -- `table_phys` is always either
        // `self.root` or a descriptor this walker wrote itself.
        let table = unsafe { &*(table_phys as *const PageTable) };
        table[idx]
            .is_valid()
            .then(|| (table[idx].0 & ADDR_MASK) as usize)
    }

    /// Installs a 4 KiB leaf mapping. Fails if `va` is already mapped.
    pub fn map_page(&mut self, va: usize, pa: usize, flags: PageFlags) -> KernelResult<()> {
        let [i0, i1, i2, i3] = indices(va);
        let l1 = self.next_level(self.root as usize, i0)?;
        let l2 = self.next_level(l1, i1)?;
        let l3 = self.next_level(l2, i2)?;
        let leaf_table = self.table_mut(l3);
        if leaf_table[i3].is_valid() {
            return Err(KernelError::AlreadyMapped { va });
        }
        leaf_table[i3].set_leaf(pa, flags);
        tlbi_va(va);
        Ok(())
    }

    /// Unmaps `va`. A VA with no existing mapping -- including one whose
    /// intermediate tables were never installed -- returns
    /// `UnmappedMemory` without allocating or mutating anything (spec
    /// §4.2: unmapping unmapped memory "returns a falsy result without
    /// panicking").
    pub fn unmap_page(&mut self, va: usize) -> KernelResult<()> {
        let [i0, i1, i2, i3] = indices(va);
        let l1 = self
            .next_level_readonly(self.root as usize, i0)
            .ok_or(KernelError::UnmappedMemory { addr: va })?;
        let l2 = self
            .next_level_readonly(l1, i1)
            .ok_or(KernelError::UnmappedMemory { addr: va })?;
        let l3 = self
            .next_level_readonly(l2, i2)
            .ok_or(KernelError::UnmappedMemory { addr: va })?;
        let leaf_table = self.table_mut(l3);
        if !leaf_table[i3].is_valid() {
            return Err(KernelError::UnmappedMemory { addr: va });
        }
        leaf_table[i3].clear();
        tlbi_va(va);
        Ok(())
    }

    /// Read-only query: never allocates, never mutates the tree.
    pub fn is_mapped(&self, va: usize) -> bool {
        let [i0, i1, i2, i3] = indices(va);
        let Some(l1) = self.next_level_readonly(self.root as usize, i0) else {
            return false;
        };
        let Some(l2) = self.next_level_readonly(l1, i1) else {
            return false;
        };
        let Some(l3) = self.next_level_readonly(l2, i2) else {
            return false;
        };
        // SAFETY: same as `table_mut` -- `l3` is a descriptor this walker
        // wrote itself (or `next_level_readonly` would have returned None).
        let leaf_table = unsafe { &*(l3 as *const PageTable) };
        leaf_table[i3].is_valid()
    }
}

fn tlbi_va(va: usize) {
    let page = (va >> 12) as u64;
    // SAFETY: TLBI VAAE1IS invalidates only the single page's translation
    // across inner-shareable observers; always legal at EL1.
    unsafe {
        core::arch::asm!("tlbi vaae1is, {}", in(reg) page, options(nostack, preserves_flags));
    }
    crate::arch::barriers::data_sync_barrier();
}
