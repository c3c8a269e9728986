//! Core database infrastructure
//!
//! This module provides the connection layer used by the migration runner:
//! - `ConnectionBuilder`: builds a `ClickHouseConn` from a `ConnectionSpec`
//! - `TlsTrustConfig` / `TlsRegistry`: trust anchors and their registration by name
//! - `Dsn`: connection string parsing

mod connection;
mod dsn;
mod tls;

pub use connection::{connect, ClickHouseConn, ConnectionBuilder, ConnectionSpec};
pub use dsn::{append_tls_config, sanitize, Dsn};
pub use tls::{TlsRegistry, TlsTrustConfig, DEFAULT_TLS_NAME};
