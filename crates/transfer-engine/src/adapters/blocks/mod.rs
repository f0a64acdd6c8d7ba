//! Block Repository Adapters
//!
//! The on-disk repository lives in `node-runtime`.

mod memory;

pub use memory::InMemoryBlockRepository;
