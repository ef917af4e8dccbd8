//! CLI command implementations.

pub mod hlc;
pub mod serve;
pub mod validate;
