//! PL011 UART console driver.
//!
//! This is the "Console (external)" collaborator from spec §6: the kernel
//! treats it as a fixed `putc`/`puts`/`getc` surface and never reasons about
//! FIFO depth, baud, or interrupt-driven RX here. QEMU's `virt` machine
//! leaves the PL011 already configured by firmware, so `init` is a no-op.

use core::fmt;

const UART_BASE: usize = 0x0900_0000;

const UARTDR: usize = 0x000;
const UARTFR: usize = 0x018;
const UARTFR_RXFE: u8 = 1 << 4;
const UARTFR_TXFF: u8 = 1 << 5;

pub struct Pl011Uart {
    base: usize,
}

impl Pl011Uart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn init(&mut self) {}

    pub fn putc(&mut self, byte: u8) {
        // SAFETY: `base` addresses the PL011 register block identity-mapped
        // as device memory by `mm::init`; TXFF must be polled clear before
        // writing UARTDR per the PL011 TRM.
        unsafe {
            while core::ptr::read_volatile((self.base + UARTFR) as *const u8) & UARTFR_TXFF != 0 {
                core::hint::spin_loop();
            }
            core::ptr::write_volatile((self.base + UARTDR) as *mut u8, byte);
        }
    }

    pub fn puts(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.putc(b);
        }
    }

    /// Blocking single-byte read.
    pub fn getc(&mut self) -> u8 {
        // SAFETY: same register block as `putc`; RXFE indicates the receive
        // FIFO is empty and must be polled before reading UARTDR.
        unsafe {
            while core::ptr::read_volatile((self.base + UARTFR) as *const u8) & UARTFR_RXFE != 0 {
                core::hint::spin_loop();
            }
            core::ptr::read_volatile((self.base + UARTDR) as *const u8)
        }
    }
}

impl fmt::Write for Pl011Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s.as_bytes());
        Ok(())
    }
}

pub fn console() -> Pl011Uart {
    Pl011Uart::new(UART_BASE)
}
