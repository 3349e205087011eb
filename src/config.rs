//! Server configuration.
//!
//! The demo is configured entirely from the command line and environment:
//! a bind address and a single port number, defaulted when unset. There is
//! no persisted state and no configuration file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// Port used when neither `--port` nor `MCP_CLOCK_PORT` is set.
pub const DEFAULT_PORT: u16 = 8334;

/// Runtime configuration for one server instance.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Port for the streamable HTTP transport.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_port: default_http_port(),
        }
    }
}

impl ServerConfig {
    /// Build a configuration for the given port on the default bind address.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self {
            http_port: port,
            ..Self::default()
        }
    }

    /// Socket address the HTTP listener binds to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }
}
