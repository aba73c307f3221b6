//! Concrete collector families.
//!
//! Each family reads one procfs source and exposes its counters as
//! descriptors; all of them parse from string content so the parsing
//! paths are testable off-Linux.

pub mod cpu;
pub mod disk;
pub mod mem;

pub use cpu::CpuFamily;
pub use disk::DiskFamily;
pub use mem::MemFamily;
