//! Shared memory image used by the mock GPU command processors.
//!
//! Ring buffers, their read/write cursors, fence targets and copy sources/destinations all live in
//! one flat 64-bit address space. Executors reach it through [`MemoryBus`]; tests and harnesses
//! usually back it with [`SparseMemory`].

pub mod bus;
pub mod sparse;

pub use bus::MemoryBus;
pub use sparse::SparseMemory;
