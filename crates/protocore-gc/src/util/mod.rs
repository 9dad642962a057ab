//! Small helpers shared across the allocator, heap, and marker modules.

pub mod alignment;
pub mod atomic;
pub mod debug;

pub use alignment::Alignment;
pub use atomic::AtomicUtils;
