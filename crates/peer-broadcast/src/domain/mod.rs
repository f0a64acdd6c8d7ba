//! Domain layer for peer broadcast.

pub mod config;
pub mod errors;
pub mod outcome;

pub use config::*;
pub use errors::*;
pub use outcome::*;
