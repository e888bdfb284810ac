//! Ambient utilities shared by the workspace crates.

pub mod log_setup;
pub mod test_utils;
