//! Split virtqueue.
//!
//! A virtqueue is three physically contiguous regions -- descriptor table,
//! available ring, used ring -- laid out per the virtio 1.0 spec (used ring
//! page-aligned after the descriptors+available ring). This is the core
//! data structure GPU and input queues are both built from; only the
//! `submit`/`wait_used` pair and the barrier placement are specific to this
//! kernel's single in-order, poll-driven usage.

#![allow(dead_code)]

use crate::arch::barriers::{dma_full_barrier, dma_store_barrier};
use crate::mm::{FrameNumber, FRAME_ALLOCATOR, FRAME_SIZE};

pub const MAX_QUEUE_SIZE: u16 = 256;

pub const VIRTQ_DESC_F_NEXT: u16 = 1;
pub const VIRTQ_DESC_F_WRITE: u16 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtqDesc {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

#[repr(C)]
pub struct VirtqAvail {
    pub flags: u16,
    pub idx: u16,
    pub ring: [u16; MAX_QUEUE_SIZE as usize],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtqUsedElem {
    pub id: u32,
    pub len: u32,
}

#[repr(C)]
pub struct VirtqUsed {
    pub flags: u16,
    pub idx: u16,
    pub ring: [VirtqUsedElem; MAX_QUEUE_SIZE as usize],
}

/// Descriptor free-list bookkeeping, factored out of `VirtQueue` so it can
/// be driven directly against a plain slice in tests instead of only
/// through a pointer into physically-allocated queue memory.
struct DescAllocator {
    free_head: u16,
    num_free: u16,
}

impl DescAllocator {
    /// `desc` must already be linked the way `VirtQueue::new` links a fresh
    /// table: each slot's `next` pointing at the following index, the last
    /// wrapping to 0.
    fn new(size: u16) -> Self {
        Self { free_head: 0, num_free: size }
    }

    fn alloc(&mut self, desc: &[VirtqDesc]) -> Option<u16> {
        if self.num_free == 0 {
            return None;
        }
        let idx = self.free_head;
        self.free_head = desc[idx as usize].next;
        self.num_free -= 1;
        Some(idx)
    }

    fn free(&mut self, desc: &mut [VirtqDesc], idx: u16) {
        desc[idx as usize].next = self.free_head;
        desc[idx as usize].flags = 0;
        self.free_head = idx;
        self.num_free += 1;
    }

    fn free_chain(&mut self, desc: &mut [VirtqDesc], head: u16) {
        let mut idx = head;
        loop {
            let (flags, next) = (desc[idx as usize].flags, desc[idx as usize].next);
            self.free(desc, idx);
            if flags & VIRTQ_DESC_F_NEXT == 0 {
                break;
            }
            idx = next;
        }
    }
}

/// A single split virtqueue, owning the physical memory backing all three
/// rings.
pub struct VirtQueue {
    size: u16,
    desc: *mut VirtqDesc,
    avail: *mut VirtqAvail,
    used: *mut VirtqUsed,
    descs: DescAllocator,
    last_used_idx: u16,
    num_frames: usize,
    first_frame: FrameNumber,
    phys_base: u64,
    avail_offset: usize,
    used_offset: usize,
}

impl VirtQueue {
    /// Allocates and zeroes the backing memory for a queue of `size`
    /// entries, clamped to `MAX_QUEUE_SIZE`, and links the free descriptor
    /// list.
    pub fn new(size: u16) -> crate::error::KernelResult<Self> {
        let size = if size == 0 || size > MAX_QUEUE_SIZE {
            MAX_QUEUE_SIZE
        } else {
            size
        };

        let desc_size = 16 * size as usize;
        let avail_size = 4 + 2 * size as usize;
        let used_offset = align_up(desc_size + avail_size, FRAME_SIZE);
        let used_size = 4 + 8 * size as usize;
        let total_size = used_offset + used_size;
        let num_frames = total_size.div_ceil(FRAME_SIZE);

        let first_frame = FRAME_ALLOCATOR.lock().alloc_pages(num_frames)?;
        let phys_base = first_frame.as_u64() * FRAME_SIZE as u64;
        let virt_base = phys_base as usize;

        // SAFETY: `virt_base` addresses `num_frames` frames just allocated
        // from the frame allocator and identity-mapped by `mm::init`; no
        // other reference to this range exists yet.
        unsafe {
            core::ptr::write_bytes(virt_base as *mut u8, 0, num_frames * FRAME_SIZE);
        }

        let desc_ptr = virt_base as *mut VirtqDesc;
        let avail_ptr = (virt_base + desc_size) as *mut VirtqAvail;
        let used_ptr = (virt_base + used_offset) as *mut VirtqUsed;

        // SAFETY: `desc_ptr` addresses `size` freshly zeroed, exclusively
        // owned `VirtqDesc` slots.
        unsafe {
            for i in 0..size {
                let d = &mut *desc_ptr.add(i as usize);
                d.next = if i + 1 < size { i + 1 } else { 0 };
            }
        }

        Ok(Self {
            size,
            desc: desc_ptr,
            avail: avail_ptr,
            used: used_ptr,
            descs: DescAllocator::new(size),
            last_used_idx: 0,
            num_frames,
            first_frame,
            phys_base,
            avail_offset: desc_size,
            used_offset,
        })
    }


    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn phys_desc(&self) -> u64 {
        self.phys_base
    }

    pub fn phys_avail(&self) -> u64 {
        self.phys_base + self.avail_offset as u64
    }

    pub fn phys_used(&self) -> u64 {
        self.phys_base + self.used_offset as u64
    }

    fn alloc_desc(&mut self) -> Option<u16> {
        // SAFETY: `desc`/`size` address `size` exclusively-owned `VirtqDesc`
        // slots for the lifetime of this queue.
        let desc = unsafe { core::slice::from_raw_parts(self.desc, self.size as usize) };
        self.descs.alloc(desc)
    }

    fn free_desc(&mut self, idx: u16) {
        // SAFETY: see `alloc_desc`.
        let desc = unsafe { core::slice::from_raw_parts_mut(self.desc, self.size as usize) };
        self.descs.free(desc, idx)
    }

    fn free_chain(&mut self, head: u16) {
        // SAFETY: see `alloc_desc`.
        let desc = unsafe { core::slice::from_raw_parts_mut(self.desc, self.size as usize) };
        self.descs.free_chain(desc, head)
    }

    /// Submits a request/response descriptor pair -- `request` read by the
    /// device, `response` written by it -- and kicks `notify`. This is the
    /// only chain shape GPU and input ever need: one driver-to-device
    /// buffer and one device-to-driver buffer.
    pub fn submit(&mut self, request: (u64, u32), response: (u64, u32), notify: impl FnOnce()) -> Option<u16> {
        let head = self.alloc_desc()?;
        let tail = self.alloc_desc().or_else(|| {
            self.free_desc(head);
            None
        })?;

        // SAFETY: `head`/`tail` were just allocated and are not aliased.
        unsafe {
            let d = &mut *self.desc.add(head as usize);
            d.addr = request.0;
            d.len = request.1;
            d.flags = VIRTQ_DESC_F_NEXT;
            d.next = tail;

            let d = &mut *self.desc.add(tail as usize);
            d.addr = response.0;
            d.len = response.1;
            d.flags = VIRTQ_DESC_F_WRITE;
            d.next = 0;
        }

        // SAFETY: `self.avail` addresses memory this queue owns exclusively.
        unsafe {
            let avail = &mut *self.avail;
            let ring_idx = avail.idx as usize % self.size as usize;
            avail.ring[ring_idx] = head;
            dma_store_barrier();
            avail.idx = avail.idx.wrapping_add(1);
        }
        dma_full_barrier();
        notify();
        Some(head)
    }

    /// Spins until the used ring reports a completion, then frees its
    /// descriptor chain and returns the bytes the device wrote.
    ///
    /// A fixed spin budget turns a wedged device into a panic rather than
    /// an infinite loop, per this kernel's no-recovery-path policy for
    /// device protocol violations.
    pub fn wait_used(&mut self) -> u32 {
        const SPIN_LIMIT: u32 = 10_000_000;
        for _ in 0..SPIN_LIMIT {
            dma_full_barrier();
            // SAFETY: `self.used` addresses memory this queue owns.
            let used_idx = unsafe { (*self.used).idx };
            if used_idx != self.last_used_idx {
                let ring_idx = self.last_used_idx as usize % self.size as usize;
                // SAFETY: `ring_idx` is modular-reduced into bounds.
                let elem = unsafe { (*self.used).ring[ring_idx] };
                self.last_used_idx = self.last_used_idx.wrapping_add(1);
                self.free_chain(elem.id as u16);
                return elem.len;
            }
            core::hint::spin_loop();
        }
        panic!("virtqueue: device did not complete a submitted request");
    }
}

impl Drop for VirtQueue {
    fn drop(&mut self) {
        FRAME_ALLOCATOR
            .lock()
            .free_pages(self.first_frame, self.num_frames);
    }
}

// SAFETY: `VirtQueue` owns its backing memory exclusively; callers serialize
// access behind a `spin::Mutex` (there is exactly one core).
unsafe impl Send for VirtQueue {}
unsafe impl Sync for VirtQueue {}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
    }

    /// Links a fresh descriptor table the same way `VirtQueue::new` does:
    /// each slot's `next` pointing at the following index, the last one
    /// wrapping to 0.
    fn fresh_table(size: u16) -> (Vec<VirtqDesc>, DescAllocator) {
        let mut desc = vec![VirtqDesc::default(); size as usize];
        for (i, d) in desc.iter_mut().enumerate() {
            d.next = if (i as u16 + 1) < size { i as u16 + 1 } else { 0 };
        }
        (desc, DescAllocator::new(size))
    }

    #[test]
    fn alloc_hands_out_the_free_list_in_order() {
        let (desc, mut alloc) = fresh_table(4);
        assert_eq!(alloc.alloc(&desc), Some(0));
        assert_eq!(alloc.alloc(&desc), Some(1));
        assert_eq!(alloc.num_free, 2);
    }

    #[test]
    fn alloc_returns_none_once_exhausted() {
        let (desc, mut alloc) = fresh_table(2);
        assert_eq!(alloc.alloc(&desc), Some(0));
        assert_eq!(alloc.alloc(&desc), Some(1));
        assert_eq!(alloc.alloc(&desc), None);
    }

    /// Mirrors `submit`'s two-descriptor chain (a `F_NEXT` head pointing at
    /// a tail) followed by `wait_used`'s `free_chain` on completion: both
    /// descriptors must return to the free set, leaving the allocator in
    /// the same state it started in.
    #[test]
    fn free_chain_returns_a_two_descriptor_submit_to_the_free_set() {
        let (mut desc, mut alloc) = fresh_table(4);
        let head = alloc.alloc(&desc).unwrap();
        let tail = alloc.alloc(&desc).unwrap();
        assert_eq!((head, tail), (0, 1));
        assert_eq!(alloc.num_free, 2);

        desc[head as usize].flags = VIRTQ_DESC_F_NEXT;
        desc[head as usize].next = tail;
        desc[tail as usize].flags = VIRTQ_DESC_F_WRITE;

        alloc.free_chain(&mut desc, head);
        assert_eq!(alloc.num_free, 4);

        // The pair comes back out exactly once each on the next two allocs.
        let mut reclaimed = [alloc.alloc(&desc).unwrap(), alloc.alloc(&desc).unwrap()];
        reclaimed.sort_unstable();
        assert_eq!(reclaimed, [head.min(tail), head.max(tail)]);
    }

    #[test]
    fn free_restores_a_single_descriptor_without_touching_others() {
        let (mut desc, mut alloc) = fresh_table(3);
        let a = alloc.alloc(&desc).unwrap();
        let b = alloc.alloc(&desc).unwrap();
        alloc.free(&mut desc, a);
        assert_eq!(alloc.num_free, 2);
        assert_eq!(alloc.alloc(&desc), Some(a));
        let _ = b;
    }
}
