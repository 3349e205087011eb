//! Unit tests for `ServerConfig` defaults and parsing.

use std::net::{IpAddr, Ipv4Addr};

use mcp_clock::config::{ServerConfig, DEFAULT_PORT};

#[test]
fn default_port_matches_constant() {
    let config = ServerConfig::default();
    assert_eq!(config.http_port, DEFAULT_PORT);
    assert_eq!(DEFAULT_PORT, 8334);
}

#[test]
fn default_bind_addr_is_loopback() {
    let config = ServerConfig::default();
    assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
}

#[test]
fn with_port_overrides_only_the_port() {
    let config = ServerConfig::with_port(9000);
    assert_eq!(config.http_port, 9000);
    assert_eq!(config.bind_addr, ServerConfig::default().bind_addr);
}

#[test]
fn socket_addr_combines_bind_and_port() {
    let config = ServerConfig::with_port(4321);
    let addr = config.socket_addr();
    assert_eq!(addr.port(), 4321);
    assert!(addr.ip().is_loopback());
}

#[test]
fn deserializes_with_defaults_for_missing_fields() {
    let config: ServerConfig = serde_json::from_str("{}").expect("empty object");
    assert_eq!(config, ServerConfig::default());
}

#[test]
fn deserializes_explicit_values() {
    let config: ServerConfig =
        serde_json::from_str(r#"{ "bind_addr": "0.0.0.0", "http_port": 8080 }"#).expect("config");
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
}
