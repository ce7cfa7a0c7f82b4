//! Platform device drivers beyond the always-present PL011/GICv2/timer
//! trio in `arch::aarch64` -- currently just the PCI ECAM host bridge and
//! the virtio-pci transport built on top of it.

pub mod pci;
pub mod virtio;
