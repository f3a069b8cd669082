//! Helpers shared by every backend.

pub mod fs;
pub mod naming;
pub mod process;
pub mod retention;
