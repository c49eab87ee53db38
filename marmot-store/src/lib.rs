//! marmot-store - Checkpoint and event persistence for Marmot runs
//!
//! Backends implementing `marmot_core::RunStore`: an append-only filesystem
//! store keyed by `(job id, run id, step number)`, and an in-memory store
//! for tests.

mod error;
pub mod fs;
pub mod memory;

pub use error::StoreError;
pub use fs::FsRunStore;
pub use memory::MemoryRunStore;
