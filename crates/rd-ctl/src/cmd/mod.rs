//! CLI command modules.

pub mod endpoints;
pub mod http;
pub mod lookup;
pub mod status;
