#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! chmigrate - ClickHouse schema migrations
//!
//! chmigrate applies ordered, versioned migration files to a ClickHouse
//! database over its HTTP interface. Applied versions are recorded in a
//! bookkeeping table, so running it again only applies what is new. It can be
//! used as both a command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `cli` | The `chmigrate` binary (default) | `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only
//! chmigrate = { version = "0.1", default-features = false }
//! ```
//!
//! # Architecture
//!
//! - **[`database`]**: connection handles and migrations
//!   - `core`: connection strings, TLS trust anchors, the `ClickHouseConn` handle
//!   - `migrate`: migration files, the bookkeeping driver, the engine and the runner
//!
//! - **[`config`]**: layered configuration (defaults, TOML file, environment, flags)
//!
//! - **[`error`]**: error types, one variant per failing phase
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chmigrate::{ConnectionBuilder, MigrateConfig, MigrationRunner};
//! use chmigrate::config::ConfigOverrides;
//!
//! let config = MigrateConfig::new(&None, &ConfigOverrides::default())?;
//!
//! // trust anchors from `pem_path` are registered under `default_tls_name`
//! let conn = ConnectionBuilder::new().build(&config.connection_spec())?;
//!
//! let applied = MigrationRunner::new(config.driver_config()).run(&conn, &config.path)?;
//! if applied.is_noop() {
//!     println!("already up to date");
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;

// =============================================================================
// Configuration
// =============================================================================

pub use self::config::{ConfigOverrides, MigrateConfig};

// =============================================================================
// Errors
// =============================================================================

pub use error::{Error, MigrationFailure, QueryError};

// =============================================================================
// Database - re-export commonly used types
// =============================================================================

// Connection layer
pub use database::{
    connect, ClickHouseConn, ConnectionBuilder, ConnectionSpec, Dsn, TlsRegistry, TlsTrustConfig,
    DEFAULT_TLS_NAME,
};

// Migrations
pub use database::{
    Applied, ClickHouseDriver, DriverConfig, FileSource, MigrationDriver, MigrationRunner,
    MigrationStep, Migrator, UpOutcome,
};
