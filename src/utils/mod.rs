//! Shared helpers: external commands, glob matching and terminal logging.

pub mod exec;
pub mod glob;
pub mod log;
