//! Synchronization primitives.
//!
//! This kernel is single-core and single-threaded between interrupts (see
//! `DESIGN.md` / spec §5), so the only primitive needed beyond interrupt
//! masking is a safe init-once cell for module-scope singletons.

pub mod once_lock;

pub use once_lock::GlobalState;
