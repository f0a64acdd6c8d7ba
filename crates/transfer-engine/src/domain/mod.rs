//! # Domain Layer
//!
//! Pure types and logic of the transfer engine. No I/O.

pub mod entities;
pub mod errors;
pub mod keys;
pub mod reconciler;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use keys::*;
pub use reconciler::*;
pub use value_objects::*;
