//! Trace import/export at the raw/physical boundary.

pub mod export;
pub mod import;
