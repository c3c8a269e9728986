//! Forward-only schema migrations
//!
//! - `source`: ordered migration steps read from a directory
//! - `driver`: version bookkeeping and statement execution against ClickHouse
//! - `engine`: applies pending steps in order
//! - `runner`: ties a handle and a directory together for one run

mod driver;
mod engine;
mod runner;
mod source;

pub use driver::{
    split_statements, ClickHouseDriver, DriverConfig, MigrationDriver, VersionState,
    DEFAULT_MIGRATIONS_TABLE, DEFAULT_MIGRATIONS_TABLE_ENGINE,
};
pub use engine::{Migrator, UpOutcome};
pub use runner::{Applied, MigrationRunner};
pub use source::{Direction, FileSource, MigrationStep};
