//! Chain Client Adapters
//!
//! The JSON-RPC client lives in `node-runtime`.

mod memory;

pub use memory::InMemoryPaymentChain;
