//! Modern virtio-pci transport.
//!
//! Discovers a device's vendor-specific PCI capabilities (common/notify/isr/
//! device config), negotiates `VIRTIO_F_VERSION_1`, and wires up split
//! virtqueues via [`queue::VirtQueue`]. GPU and input command encoding sit
//! on top of this and are out of scope here -- this module only gets a
//! device through the handshake to `DRIVER_OK` and exposes `notify`/
//! `device_cfg_ptr` for whatever sits above it.

#![allow(dead_code)]

pub mod queue;

use crate::drivers::pci::{Bdf, Ecam};
use crate::error::{KernelError, KernelResult};
use core::sync::atomic::{AtomicUsize, Ordering};

pub const VIRTIO_VENDOR_ID: u16 = 0x1AF4;
pub const VIRTIO_GPU_DEVICE_ID: u16 = 0x1050;
pub const VIRTIO_INPUT_DEVICE_ID: u16 = 0x1052;

const PCI_CAP_ID_VNDR: u8 = 0x09;
const CFG_TYPE_COMMON: u8 = 1;
const CFG_TYPE_NOTIFY: u8 = 2;
const CFG_TYPE_ISR: u8 = 3;
const CFG_TYPE_DEVICE: u8 = 4;

pub mod status {
    pub const ACKNOWLEDGE: u8 = 1;
    pub const DRIVER: u8 = 2;
    pub const DRIVER_OK: u8 = 4;
    pub const FEATURES_OK: u8 = 8;
    pub const DEVICE_NEEDS_RESET: u8 = 64;
    pub const FAILED: u8 = 128;
}

pub const F_VERSION_1: u64 = 1 << 32;

/// `virtio_pci_common_cfg`, mapped directly at the BAR offset the common-cfg
/// capability names.
#[repr(C)]
struct CommonCfg {
    device_feature_select: u32,
    device_feature: u32,
    driver_feature_select: u32,
    driver_feature: u32,
    msix_config: u16,
    num_queues: u16,
    device_status: u8,
    config_generation: u8,
    queue_select: u16,
    queue_size: u16,
    queue_msix_vector: u16,
    queue_enable: u16,
    queue_notify_off: u16,
    queue_desc: u64,
    queue_driver: u64,
    queue_device: u64,
}

/// BAR window this kernel hands out virtio-pci BARs from when firmware left
/// them unassigned, matching the device-memory region `mm::init` maps.
const BAR_WINDOW_BASE: usize = 0x1000_0000;
const BAR_WINDOW_SIZE: usize = 0x1000_0000;
static BAR_BUMP: AtomicUsize = AtomicUsize::new(BAR_WINDOW_BASE);

fn assign_bar(size: u64) -> usize {
    let size = (size.max(0x1000) as usize).next_power_of_two();
    loop {
        let base = BAR_BUMP.load(Ordering::Relaxed);
        let aligned = (base + size - 1) & !(size - 1);
        let next = aligned + size;
        assert!(
            next <= BAR_WINDOW_BASE + BAR_WINDOW_SIZE,
            "virtio-pci: PCI BAR window exhausted"
        );
        if BAR_BUMP
            .compare_exchange(base, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            return aligned;
        }
    }
}

/// A discovered device's vendor-specific capability, before its BAR has
/// necessarily been mapped or assigned.
struct Cap {
    cfg_type: u8,
    bar: u8,
    offset: u32,
    length: u32,
}

/// Modern virtio-pci transport for one function.
pub struct Transport {
    bdf: Bdf,
    common: *mut CommonCfg,
    notify_base: usize,
    notify_off_multiplier: u32,
    isr: *mut u8,
    device_cfg: *mut u8,
}

// SAFETY: every raw pointer here addresses device MMIO identity-mapped by
// `mm::init`; access is always through a single owning `Transport`.
unsafe impl Send for Transport {}

impl Transport {
    /// Parses the capability chain and maps each region's BAR, assigning a
    /// fresh BAR base when the device (or QEMU's firmware-less boot) left
    /// one unprogrammed. Returns `None` if the function isn't a
    /// vendor-specific virtio-pci device at all.
    pub fn discover(ecam: &Ecam, bdf: Bdf) -> KernelResult<Self> {
        let (vendor, _device) = ecam.vendor_device_id(bdf);
        if vendor != VIRTIO_VENDOR_ID {
            return Err(KernelError::NotFound { resource: "virtio-pci device" });
        }

        ecam.enable_mem_busmaster(bdf);

        let mut common = None;
        let mut notify = None;
        let mut isr = None;
        let mut device = None;

        let mut ptr = ecam.read8(bdf, 0x34) & !0b11;
        let mut guard = 0;
        while ptr != 0 && guard < 64 {
            let id = ecam.read8(bdf, ptr as usize);
            if id == PCI_CAP_ID_VNDR {
                let cfg_type = ecam.read8(bdf, ptr as usize + 3);
                let bar = ecam.read8(bdf, ptr as usize + 4);
                let offset = ecam.read32(bdf, ptr as usize + 8);
                let length = ecam.read32(bdf, ptr as usize + 12);
                let cap = Cap { cfg_type, bar, offset, length };
                match cfg_type {
                    CFG_TYPE_COMMON => common = Some(cap),
                    CFG_TYPE_NOTIFY => {
                        let mult = ecam.read32(bdf, ptr as usize + 16);
                        notify = Some((cap, mult));
                    }
                    CFG_TYPE_ISR => isr = Some(cap),
                    CFG_TYPE_DEVICE => device = Some(cap),
                    _ => {}
                }
            }
            ptr = ecam.read8(bdf, ptr as usize + 1) & !0b11;
            guard += 1;
        }

        let common = common.ok_or(KernelError::DeviceProtocolViolation { device: "virtio-pci" })?;
        let (notify, notify_off_multiplier) =
            notify.ok_or(KernelError::DeviceProtocolViolation { device: "virtio-pci" })?;
        let isr = isr.ok_or(KernelError::DeviceProtocolViolation { device: "virtio-pci" })?;
        let device = device.ok_or(KernelError::DeviceProtocolViolation { device: "virtio-pci" })?;

        let common_base = bar_addr(ecam, bdf, &common);
        let notify_base = bar_addr(ecam, bdf, &notify);
        let isr_base = bar_addr(ecam, bdf, &isr);
        let device_base = bar_addr(ecam, bdf, &device);

        Ok(Self {
            bdf,
            common: common_base as *mut CommonCfg,
            notify_base,
            notify_off_multiplier,
            isr: isr_base as *mut u8,
            device_cfg: device_base as *mut u8,
        })
    }

    fn cfg(&self) -> &mut CommonCfg {
        // SAFETY: `common` was mapped during `discover` and lives for the
        // transport's lifetime; access is serialized by the caller (each
        // device owns one `Transport`, never shared mutably).
        unsafe { &mut *self.common }
    }

    pub fn reset(&self) {
        // SAFETY: writes a single byte field of the mapped common-cfg BAR.
        unsafe { core::ptr::write_volatile(core::ptr::addr_of_mut!((*self.common).device_status), 0) };
    }

    fn status(&self) -> u8 {
        // SAFETY: see `reset`.
        unsafe { core::ptr::read_volatile(core::ptr::addr_of!((*self.common).device_status)) }
    }

    fn set_status(&self, status: u8) {
        // SAFETY: see `reset`.
        unsafe { core::ptr::write_volatile(core::ptr::addr_of_mut!((*self.common).device_status), status) };
    }

    /// Runs the device through ACKNOWLEDGE -> DRIVER -> feature negotiation
    /// -> FEATURES_OK, requiring at least `required` (which must include
    /// `F_VERSION_1`; this transport cannot speak the legacy protocol).
    pub fn negotiate_features(&self, required: u64) -> KernelResult<()> {
        self.reset();
        self.set_status(status::ACKNOWLEDGE);
        self.set_status(status::ACKNOWLEDGE | status::DRIVER);

        let cfg = self.cfg();
        cfg.device_feature_select = 0;
        let low = cfg.device_feature;
        cfg.device_feature_select = 1;
        let high = cfg.device_feature;
        let offered = (low as u64) | ((high as u64) << 32);

        if !features_satisfied(offered, required) {
            self.set_status(status::FAILED);
            return Err(KernelError::UnsupportedFeatures { device: "virtio-pci" });
        }

        cfg.driver_feature_select = 0;
        cfg.driver_feature = required as u32;
        cfg.driver_feature_select = 1;
        cfg.driver_feature = (required >> 32) as u32;

        self.set_status(status::ACKNOWLEDGE | status::DRIVER | status::FEATURES_OK);
        if self.status() & status::FEATURES_OK == 0 {
            self.set_status(status::FAILED);
            return Err(KernelError::UnsupportedFeatures { device: "virtio-pci" });
        }
        Ok(())
    }

    /// Programs queue `index`'s descriptor/available/used addresses from
    /// `q` and enables it. The size written is `min(device max, q's own
    /// size)`: the device's `queue_size` reads back as its maximum before
    /// the driver writes anything, per the virtio-pci handshake.
    pub fn setup_queue(&self, index: u16, q: &queue::VirtQueue) {
        let cfg = self.cfg();
        cfg.queue_select = index;
        cfg.queue_size = negotiated_queue_size(cfg.queue_size, q.size());
        cfg.queue_desc = q.phys_desc();
        cfg.queue_driver = q.phys_avail();
        cfg.queue_device = q.phys_used();
        cfg.queue_enable = 1;
    }

    /// Address to write `index` to in order to kick queue `index`, per its
    /// `queue_notify_off * notify_off_multiplier` offset into the notify
    /// BAR.
    pub fn notify(&self, index: u16) {
        let cfg = self.cfg();
        cfg.queue_select = index;
        let off = cfg.queue_notify_off as usize * self.notify_off_multiplier as usize;
        let addr = (self.notify_base + off) as *mut u16;
        // SAFETY: `addr` falls inside the notify BAR mapped in `discover`.
        unsafe { core::ptr::write_volatile(addr, index) };
    }

    pub fn set_driver_ok(&self) {
        let current = self.status();
        self.set_status(current | status::DRIVER_OK);
    }

    /// Reading ISR status acknowledges the interrupt per the virtio spec.
    pub fn isr_status(&self) -> u8 {
        // SAFETY: `isr` was mapped in `discover`.
        unsafe { core::ptr::read_volatile(self.isr) }
    }

    pub fn device_cfg_ptr(&self) -> *mut u8 {
        self.device_cfg
    }

    pub fn bdf(&self) -> Bdf {
        self.bdf
    }
}

fn bar_addr(ecam: &Ecam, bdf: Bdf, cap: &Cap) -> usize {
    let base = match ecam.bar64(bdf, cap.bar) {
        Some(base) if base != 0 => base as usize,
        _ => {
            let assigned = assign_bar(cap.offset as u64 + cap.length as u64);
            let bar_offset = 0x10 + cap.bar as usize * 4;
            ecam.write32(bdf, bar_offset, assigned as u32);
            assigned
        }
    };
    base + cap.offset as usize
}

/// Does `offered` cover every bit `required` asks for? Split out of
/// `negotiate_features` so the bit math is host-testable without a real
/// MMIO common-cfg BAR.
fn features_satisfied(offered: u64, required: u64) -> bool {
    required & !offered == 0
}

/// `min(device_max, driver_cap)`, also clamped to this transport's hard
/// `MAX_QUEUE_SIZE`. Split out of `setup_queue` for the same reason as
/// `features_satisfied`.
fn negotiated_queue_size(device_max: u16, driver_cap: u16) -> u16 {
    device_max.min(queue::MAX_QUEUE_SIZE).min(driver_cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_satisfied_requires_every_required_bit_offered() {
        assert!(features_satisfied(F_VERSION_1 | 0b10, F_VERSION_1));
        assert!(!features_satisfied(0, F_VERSION_1));
        assert!(!features_satisfied(F_VERSION_1, F_VERSION_1 | 0b100));
    }

    #[test]
    fn negotiated_queue_size_picks_the_smallest_of_all_three_caps() {
        assert_eq!(negotiated_queue_size(128, 256), 128);
        assert_eq!(negotiated_queue_size(256, 64), 64);
        assert_eq!(negotiated_queue_size(1000, 1000), queue::MAX_QUEUE_SIZE);
    }
}
