//! Schema module - configuration, search-space, and artifact types.

mod config;
mod report;
mod space;

pub use config::*;
pub use report::*;
pub use space::*;
