//! Infrastructure Adapters
//!
//! Clocks and id generators.

mod ids;
mod time;

pub use ids::{RandomIdSource, ScriptedIdSource};
pub use time::{FixedTimeSource, SystemTimeSource};
