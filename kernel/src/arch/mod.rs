//! Architecture support.
//!
//! This kernel targets a single platform (`aarch64-unknown-none` on the
//! QEMU `virt` machine) -- there is no multi-arch abstraction layer to
//! maintain, unlike the workspace this was adapted from.

pub mod aarch64;
pub mod barriers;
