//! Model Context Protocol server layer.

pub mod handler;
pub mod http;
pub mod tools;
pub mod transport;
