#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod mcp;
pub mod session;

pub use config::ServerConfig;
pub use errors::{AppError, Result};
