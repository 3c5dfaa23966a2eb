//! CLI command implementations.

mod browser;
pub(crate) mod serve;

pub(crate) use serve::ServeArgs;
