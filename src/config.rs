use config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::database::migrate::{DEFAULT_MIGRATIONS_TABLE, DEFAULT_MIGRATIONS_TABLE_ENGINE};
use crate::database::{ConnectionSpec, DriverConfig};
use crate::error::Error;

/// Prefix for environment variables, e.g. `CHMIGRATE_DATABASE`
pub const ENV_PREFIX: &str = "CHMIGRATE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// ClickHouse connection string
    pub database: String,

    /// Path to a PEM bundle of trusted root certificates
    pub pem_path: String,

    /// Directory holding the migration files
    pub path: String,

    /// Table recording applied versions
    pub migrations_table: String,

    /// Engine of the migrations table
    pub migrations_table_engine: String,

    /// Create the migrations table on this cluster (empty: no cluster)
    pub cluster_name: String,

    /// Split migration files into statements on `;`
    pub multi_statement: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            pem_path: String::new(),
            path: "migrations".to_string(),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            migrations_table_engine: DEFAULT_MIGRATIONS_TABLE_ENGINE.to_string(),
            cluster_name: String::new(),
            multi_statement: true,
        }
    }
}

/// Values given on the command line; `Some` wins over every other layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database: Option<String>,
    pub pem_path: Option<String>,
    pub path: Option<String>,
}

impl MigrateConfig {
    /// Build the configuration from defaults, an optional TOML file, the
    /// environment and finally command line overrides.
    pub fn new(
        path: &Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<MigrateConfig, Error> {
        let defaults = MigrateConfig::default();
        let mut builder = Config::builder()
            .set_default("database", defaults.database)
            .and_then(|b| b.set_default("pem_path", defaults.pem_path))
            .and_then(|b| b.set_default("path", defaults.path))
            .and_then(|b| b.set_default("migrations_table", defaults.migrations_table))
            .and_then(|b| {
                b.set_default("migrations_table_engine", defaults.migrations_table_engine)
            })
            .and_then(|b| b.set_default("cluster_name", defaults.cluster_name))
            .and_then(|b| b.set_default("multi_statement", defaults.multi_statement))
            .map_err(|e| Error::config(format!("failed to set configuration defaults: {}", e)))?;

        // Add in toml configuration file
        if let Some(p) = path {
            let path = Path::new(p.as_str());
            if !path.exists() {
                return Err(Error::config(format!("config file {} does not exist", p)));
            }
            builder =
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        // Add in settings from the environment (with a prefix of CHMIGRATE)
        // E.g., `CHMIGRATE_DATABASE=clickhouse://... ./chmigrate` would set the connection string
        builder =
            builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        builder = builder
            .set_override_option("database", overrides.database.clone())
            .and_then(|b| b.set_override_option("pem_path", overrides.pem_path.clone()))
            .and_then(|b| b.set_override_option("path", overrides.path.clone()))
            .map_err(|e| Error::config(format!("failed to apply command line flags: {}", e)))?;

        let settings = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        settings
            .try_deserialize::<MigrateConfig>()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))
    }

    pub fn connection_spec(&self) -> ConnectionSpec {
        let spec = ConnectionSpec::new(self.database.as_str());
        if self.pem_path.is_empty() {
            spec
        } else {
            spec.with_trust_anchor(self.pem_path.as_str())
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            migrations_table: self.migrations_table.clone(),
            migrations_table_engine: self.migrations_table_engine.clone(),
            cluster_name: if self.cluster_name.is_empty() {
                None
            } else {
                Some(self.cluster_name.clone())
            },
            multi_statement: self.multi_statement,
        }
    }

    pub fn migrations_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = [
            format!(
                "Database:           {}",
                crate::database::core::sanitize(&self.database)
            ),
            format!(
                "Trust Anchors:      {}",
                if self.pem_path.is_empty() {
                    "(driver default)"
                } else {
                    self.pem_path.as_str()
                }
            ),
            format!("Migrations Path:    {}", self.path),
            format!(
                "Migrations Table:   {} ({})",
                self.migrations_table, self.migrations_table_engine
            ),
            format!("Multi Statement:    {}", self.multi_statement),
        ];
        lines.join("\n")
    }
}
