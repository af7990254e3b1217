//! Ember ABI crate: stable contracts shared by the core and backend runtimes.

pub mod error;
pub mod params;
pub mod token;

pub use error::*;
pub use params::*;
pub use token::*;
