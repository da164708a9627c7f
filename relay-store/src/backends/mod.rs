//! Record store implementations
//!
//! - `memory`: in-process storage
//! - `test`: memory storage plus synchronization helpers for tests

pub mod memory;

pub use memory::MemoryRecordStore;
pub use test::TestRecordStore;
