//! Forward-only migration engine
//!
//! [`Migrator`] binds a [`MigrationDriver`] to a [`FileSource`] and applies
//! every step newer than the recorded version, in ascending order, stopping at
//! the first failure. A step is recorded only after all of its statements
//! succeeded, so re-running after a failure resumes at the failed step.

use tracing::{debug, info};

use super::driver::MigrationDriver;
use super::source::FileSource;
use crate::error::MigrationFailure;

/// Result of [`Migrator::up`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpOutcome {
    /// Every step in the source was already applied
    NoChange,
    /// Versions applied by this call, in order
    Applied(Vec<u64>),
}

pub struct Migrator<'s, D> {
    driver: D,
    source: &'s FileSource,
}

impl<'s, D: MigrationDriver> Migrator<'s, D> {
    pub fn new(driver: D, source: &'s FileSource) -> Self {
        Self { driver, source }
    }

    /// Apply all pending steps.
    pub fn up(&mut self) -> Result<UpOutcome, MigrationFailure> {
        let current = self
            .driver
            .version()
            .map_err(MigrationFailure::ReadVersion)?;

        if let Some(state) = current {
            if state.dirty {
                return Err(MigrationFailure::Dirty(state.version));
            }
        }
        let current = current.map(|s| s.version);
        match current {
            Some(v) => info!("current version: {}", v),
            None => info!("no migrations applied yet"),
        }

        let mut applied = Vec::new();
        for step in self.source.pending_after(current) {
            debug!("applying {}", step.path.display());
            self.driver
                .run(step)
                .map_err(|cause| MigrationFailure::Step {
                    version: step.version,
                    name: step.name.clone(),
                    source: cause,
                })?;
            self.driver
                .set_version(step.version, false)
                .map_err(|cause| MigrationFailure::RecordVersion {
                    version: step.version,
                    source: cause,
                })?;
            info!("applied migration {}", step);
            applied.push(step.version);
        }

        if applied.is_empty() {
            Ok(UpOutcome::NoChange)
        } else {
            Ok(UpOutcome::Applied(applied))
        }
    }
}
