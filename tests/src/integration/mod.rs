//! Cross-crate integration tests.

mod peer_network;
mod persistent_node;
mod transfer_flow;
