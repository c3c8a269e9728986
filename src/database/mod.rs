//! Database module
//!
//! This module provides all database functionality for chmigrate, organized into:
//!
//! - **core**: connection handles, connection strings and TLS trust
//! - **migrate**: migration source, driver, engine and runner
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # ConnectionBuilder and the ClickHouseConn handle
//! │   ├── dsn         # Connection string parsing
//! │   └── tls         # Trust anchors and the named TLS registry
//! │
//! └── migrate/        # Schema migrations
//!     ├── source      # Ordered steps from a directory
//!     ├── driver      # Bookkeeping table and statement execution
//!     ├── engine      # Apply pending steps in order
//!     └── runner      # One run: adapt, bind, apply
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use chmigrate::database::{ConnectionBuilder, ConnectionSpec, DriverConfig, MigrationRunner};
//!
//! let spec = ConnectionSpec::new("clickhouse://ch1:8443?secure=true&database=events")
//!     .with_trust_anchor("/etc/ssl/ch-root.pem");
//! let conn = ConnectionBuilder::new().build(&spec)?;
//!
//! let applied = MigrationRunner::new(DriverConfig::default()).run(&conn, "migrations")?;
//! println!("applied {} migration(s)", applied.count());
//! ```

pub mod core;
pub mod migrate;

pub use self::core::{
    connect, ClickHouseConn, ConnectionBuilder, ConnectionSpec, Dsn, TlsRegistry, TlsTrustConfig,
    DEFAULT_TLS_NAME,
};
pub use migrate::{
    Applied, ClickHouseDriver, DriverConfig, FileSource, MigrationDriver, MigrationRunner,
    MigrationStep, Migrator, UpOutcome,
};
