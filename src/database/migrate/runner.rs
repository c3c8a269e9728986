//! Migration runner
//!
//! Drives one forward migration run against a handle:
//!
//! 1. adapt the handle into a [`ClickHouseDriver`] (creates the bookkeeping table)
//! 2. bind the migration directory as a [`FileSource`]
//! 3. apply everything pending
//!
//! "Nothing pending" is a successful run that applied zero steps.

use std::path::Path;

use tracing::{debug, info};

use super::driver::{ClickHouseDriver, DriverConfig, MigrationDriver};
use super::engine::{Migrator, UpOutcome};
use super::source::FileSource;
use crate::database::core::ClickHouseConn;
use crate::error::Error;

/// Versions applied by a successful run, in order. Empty when the target was
/// already up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub versions: Vec<u64>,
}

impl Applied {
    pub fn count(&self) -> usize {
        self.versions.len()
    }

    /// True when nothing was pending
    pub fn is_noop(&self) -> bool {
        self.versions.is_empty()
    }
}

impl From<UpOutcome> for Applied {
    fn from(outcome: UpOutcome) -> Self {
        match outcome {
            UpOutcome::NoChange => Applied::default(),
            UpOutcome::Applied(versions) => Applied { versions },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationRunner {
    config: DriverConfig,
}

impl MigrationRunner {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Apply all pending migrations under `source_path` to `conn`.
    pub fn run(
        &self,
        conn: &ClickHouseConn,
        source_path: impl AsRef<Path>,
    ) -> Result<Applied, Error> {
        debug!("adapting handle for {}", conn.endpoint());
        let driver = ClickHouseDriver::with_instance(conn, self.config.clone())?;
        self.run_with_driver(driver, source_path)
    }

    /// Same as [`run`](Self::run) with an already adapted driver.
    pub fn run_with_driver<D: MigrationDriver>(
        &self,
        driver: D,
        source_path: impl AsRef<Path>,
    ) -> Result<Applied, Error> {
        let source_path = source_path.as_ref();
        debug!("binding migration source {}", source_path.display());
        let source = FileSource::open(source_path)?;

        let outcome = Migrator::new(driver, &source)
            .up()
            .map_err(Error::Migration)?;

        let applied = Applied::from(outcome);
        if applied.is_noop() {
            info!("no change: all {} migration(s) already applied", source.len());
        } else {
            info!("applied {} migration(s)", applied.count());
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::{connect, ConnectionSpec};
    use crate::database::migrate::engine::tests::{write_step, MemoryDriver};
    use crate::error::MigrationFailure;

    #[test]
    fn test_run_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_step(dir.path(), "0001_events.up.sql", "CREATE TABLE events");
        write_step(dir.path(), "0002_index.up.sql", "ALTER TABLE events ADD INDEX");

        let runner = MigrationRunner::default();
        let mut driver = MemoryDriver::default();

        let first = runner.run_with_driver(&mut driver, dir.path()).unwrap();
        assert_eq!(first.versions, vec![1, 2]);
        let records_after_first = driver.records.clone();

        let second = runner.run_with_driver(&mut driver, dir.path()).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.count(), 0);
        assert_eq!(driver.records, records_after_first);
        assert_eq!(driver.executed.len(), 2);
    }

    #[test]
    fn test_failure_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        write_step(dir.path(), "0001_a.up.sql", "A");
        write_step(dir.path(), "0002_b.up.sql", "FAIL");
        write_step(dir.path(), "0003_c.up.sql", "C");

        let mut driver = MemoryDriver {
            fail_marker: Some("FAIL".to_string()),
            ..Default::default()
        };
        let err = MigrationRunner::default()
            .run_with_driver(&mut driver, dir.path())
            .unwrap_err();

        match err {
            Error::Migration(failure @ MigrationFailure::Step { .. }) => {
                assert_eq!(failure.version(), Some(2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(driver.executed, vec!["A"]);
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = MemoryDriver::default();
        let err = MigrationRunner::default()
            .run_with_driver(&mut driver, dir.path().join("migrations"))
            .unwrap_err();
        assert!(matches!(err, Error::SourceInit { .. }));
        assert!(driver.records.is_empty());
    }

    #[test]
    fn test_unreachable_server_fails_driver_init() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&ConnectionSpec::new("http://127.0.0.1:1")).unwrap();
        let err = MigrationRunner::default().run(&conn, dir.path()).unwrap_err();
        assert!(matches!(err, Error::DriverInit(_)));
    }

    #[test]
    fn test_invalid_driver_config() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&ConnectionSpec::new("http://127.0.0.1:1")).unwrap();
        let runner = MigrationRunner::new(DriverConfig {
            migrations_table: "bad table".to_string(),
            ..Default::default()
        });
        assert!(matches!(runner.run(&conn, dir.path()), Err(Error::Config(_))));
    }
}
