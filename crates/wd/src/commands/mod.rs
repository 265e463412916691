//! CLI command implementations.

pub(crate) mod serve;
pub(crate) mod version;

pub(crate) use serve::ServeArgs;
