//! Kernel error types.
//!
//! Covers the "Reported" error class (see spec §7): conditions a caller can
//! inspect and decide whether to retry or escalate. Fatal conditions
//! (double-free, heap/page-table corruption, unknown synchronous exceptions)
//! are never represented here -- they panic directly at the point of
//! detection instead of being propagated as values.

use core::fmt;

/// Kernel-wide error type for the Reported error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No frame or contiguous run of frames was available.
    OutOfMemory { requested: usize, available: usize },
    /// An address was not page-aligned or fell outside a valid window.
    InvalidAddress { addr: usize },
    /// A virtual address had no mapping when one was required.
    UnmappedMemory { addr: usize },
    /// `map_page` was called on a VA that already holds a leaf descriptor.
    AlreadyMapped { va: usize },

    /// A PCI/virtio capability chain did not contain a required entry, or a
    /// device failed the feature-negotiation handshake.
    DeviceProtocolViolation { device: &'static str },
    /// `VERSION_1` was not offered by a device during negotiation.
    UnsupportedFeatures { device: &'static str },

    /// Generic invalid-argument case not covered by a more specific variant.
    InvalidArgument { name: &'static str },
    OperationNotSupported { operation: &'static str },
    ResourceExhausted { resource: &'static str },
    AlreadyExists { resource: &'static str },
    NotFound { resource: &'static str },
    Timeout { operation: &'static str },
    /// A subsystem was used before its `init()` ran.
    NotInitialized { subsystem: &'static str },
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {requested} frames, {available} available"
            ),
            KernelError::InvalidAddress { addr } => write!(f, "invalid address {addr:#x}"),
            KernelError::UnmappedMemory { addr } => write!(f, "unmapped address {addr:#x}"),
            KernelError::AlreadyMapped { va } => write!(f, "{va:#x} is already mapped"),
            KernelError::DeviceProtocolViolation { device } => {
                write!(f, "{device}: device protocol violation")
            }
            KernelError::UnsupportedFeatures { device } => {
                write!(f, "{device}: required feature bits not offered")
            }
            KernelError::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
            KernelError::OperationNotSupported { operation } => {
                write!(f, "operation not supported: {operation}")
            }
            KernelError::ResourceExhausted { resource } => {
                write!(f, "resource exhausted: {resource}")
            }
            KernelError::AlreadyExists { resource } => write!(f, "already exists: {resource}"),
            KernelError::NotFound { resource } => write!(f, "not found: {resource}"),
            KernelError::Timeout { operation } => write!(f, "timed out: {operation}"),
            KernelError::NotInitialized { subsystem } => {
                write!(f, "{subsystem} used before init()")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::fmt::Write;

    use super::*;

    #[test]
    fn display_includes_payload() {
        let e = KernelError::OutOfMemory {
            requested: 4,
            available: 1,
        };
        let mut buf = heapless_buf::Buf::new();
        write!(buf, "{e}").unwrap();
        assert!(buf.as_str().contains('4'));
        assert!(buf.as_str().contains('1'));
    }

    /// Tiny fixed-size `fmt::Write` sink so this test does not depend on `alloc`.
    mod heapless_buf {
        use core::fmt;

        pub struct Buf {
            data: [u8; 64],
            len: usize,
        }

        impl Buf {
            pub fn new() -> Self {
                Self {
                    data: [0; 64],
                    len: 0,
                }
            }

            pub fn as_str(&self) -> &str {
                core::str::from_utf8(&self.data[..self.len]).unwrap()
            }
        }

        impl fmt::Write for Buf {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                let bytes = s.as_bytes();
                self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
                self.len += bytes.len();
                Ok(())
            }
        }
    }
}
