//! Process-wide logging setup for the operator binaries.

mod logger;
pub use logger::*;
