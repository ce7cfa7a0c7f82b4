//! Console print macros and the `log` crate backend.
//!
//! `print!`/`println!` go straight to the PL011 console unconditionally
//! (spec §6: "The kernel uses these unconditionally for diagnostics").
//! [`KernelLogger`] sits on top for everything that should also carry a
//! level and target, the way the rest of the workspace already depends on
//! `log` for.

use core::fmt::Write;

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    let mut uart = crate::arch::aarch64::serial::console();
    let _ = uart.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// `log::Log` implementation routing records through the PL011 console.
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::println!(
            "[{level:<5} {target}] {args}",
            level = record.level(),
            target = record.target(),
            args = record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the kernel logger. Called once from boot entry before any other
/// subsystem uses `log::info!`/`log::warn!`/etc.
pub fn init_logger() {
    #[cfg(debug_assertions)]
    const LEVEL: log::LevelFilter = log::LevelFilter::Trace;
    #[cfg(not(debug_assertions))]
    const LEVEL: log::LevelFilter = log::LevelFilter::Info;

    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LEVEL))
        .expect("logger must be installed exactly once");
}
