//! Migration file source
//!
//! A migration directory holds one file per step and direction:
//!
//! ```text
//! migrations/
//! ├── 0001_create_events.up.sql
//! ├── 0001_create_events.down.sql
//! ├── 0002_add_country.up.sql
//! └── README.md
//! ```
//!
//! Only `up` files are loaded. `down` files are checked for a valid name but
//! otherwise ignored, and files that are neither are skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Error;

/// Direction encoded in a migration file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// A single forward migration step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: u64,
    /// Title part of the file name, e.g. `create_events`
    pub name: String,
    pub path: PathBuf,
    pub body: String,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.name)
    }
}

/// Ordered migration steps loaded from a directory
#[derive(Debug, Clone)]
pub struct FileSource {
    steps: BTreeMap<u64, MigrationStep>,
}

impl FileSource {
    /// Read and validate every migration file under `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::source_init(path, "not a directory"));
        }

        let entries =
            std::fs::read_dir(path).map_err(|e| Error::source_init(path, e.to_string()))?;

        let mut steps: BTreeMap<u64, MigrationStep> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::source_init(path, e.to_string()))?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();

            let (version, name, direction) = match parse_file_name(&file_name) {
                Some(parsed) => parsed.map_err(|reason| {
                    Error::source_init(path, format!("{}: {}", file_name, reason))
                })?,
                None => {
                    debug!("skipping {}", file_name);
                    continue;
                }
            };
            if direction == Direction::Down {
                continue;
            }

            if let Some(existing) = steps.get(&version) {
                return Err(Error::source_init(
                    path,
                    format!(
                        "duplicate migration version {}: {} and {}",
                        version,
                        existing.path.display(),
                        file_path.display()
                    ),
                ));
            }

            let body = std::fs::read_to_string(&file_path).map_err(|e| {
                Error::source_init(path, format!("failed to read {}: {}", file_name, e))
            })?;

            steps.insert(
                version,
                MigrationStep {
                    version,
                    name,
                    path: file_path,
                    body,
                },
            );
        }

        debug!("loaded {} migration(s) from {}", steps.len(), path.display());

        Ok(FileSource { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in ascending version order
    pub fn steps(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.values()
    }

    /// Steps with a version strictly greater than `version`, ascending.
    /// `None` means nothing has been applied yet.
    pub fn pending_after(&self, version: Option<u64>) -> impl Iterator<Item = &MigrationStep> {
        let lower = match version {
            Some(v) => std::ops::Bound::Excluded(v),
            None => std::ops::Bound::Unbounded,
        };
        self.steps
            .range((lower, std::ops::Bound::Unbounded))
            .map(|(_, step)| step)
    }

    pub fn get(&self, version: u64) -> Option<&MigrationStep> {
        self.steps.get(&version)
    }
}

/// Parse `<version>_<title>.<up|down>.<ext>`.
///
/// Returns `None` for names that are not migration files at all, and an
/// error for names that look like migration files but are malformed.
fn parse_file_name(file_name: &str) -> Option<Result<(u64, String, Direction), String>> {
    let (stem, direction) = if let Some(idx) = file_name.find(".up.") {
        (&file_name[..idx], Direction::Up)
    } else if let Some(idx) = file_name.find(".down.") {
        (&file_name[..idx], Direction::Down)
    } else {
        return None;
    };

    let malformed = |reason: &str| Some(Err(format!("malformed migration file name, {}", reason)));

    let (version, title) = match stem.split_once('_') {
        Some(parts) => parts,
        None => return malformed("expected <version>_<title>"),
    };
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) {
        return malformed("version is not a number");
    }
    // versions are stored as Int64
    let version = match version.parse::<i64>() {
        Ok(v) => v as u64,
        Err(_) => return malformed("version out of range"),
    };

    Some(Ok((version, title.to_string(), direction)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name("0001_create_events.up.sql").unwrap().unwrap(),
            (1, "create_events".to_string(), Direction::Up)
        );
        assert_eq!(
            parse_file_name("20240101120000_drop.down.sql")
                .unwrap()
                .unwrap(),
            (20240101120000, "drop".to_string(), Direction::Down)
        );
        assert!(parse_file_name("README.md").is_none());
        assert!(parse_file_name(".gitkeep").is_none());
        assert!(parse_file_name("create.up.sql").unwrap().is_err());
        assert!(parse_file_name("v1_create.up.sql").unwrap().is_err());
    }

    #[test]
    fn test_version_range() {
        assert_eq!(
            parse_file_name("9223372036854775807_last.up.sql")
                .unwrap()
                .unwrap()
                .0,
            i64::MAX as u64
        );
        assert!(parse_file_name("9223372036854775808_too_big.up.sql")
            .unwrap()
            .is_err());
        assert!(parse_file_name("18446744073709551615_max.down.sql")
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_open_orders_by_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0003_third.up.sql", "SELECT 3");
        write(dir.path(), "0001_first.up.sql", "SELECT 1");
        write(dir.path(), "0001_first.down.sql", "SELECT -1");
        write(dir.path(), "0002_second.up.sql", "SELECT 2");
        write(dir.path(), "README.md", "docs");
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        let source = FileSource::open(dir.path()).unwrap();
        let versions: Vec<u64> = source.steps().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(source.get(1).unwrap().body, "SELECT 1");
        assert_eq!(source.get(2).unwrap().to_string(), "2/second");
    }

    #[test]
    fn test_pending_after() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.up.sql", "");
        write(dir.path(), "0002_b.up.sql", "");
        write(dir.path(), "0010_c.up.sql", "");
        let source = FileSource::open(dir.path()).unwrap();

        let pending = |v| source.pending_after(v).map(|s| s.version).collect::<Vec<_>>();
        assert_eq!(pending(None), vec![1, 2, 10]);
        assert_eq!(pending(Some(1)), vec![2, 10]);
        assert_eq!(pending(Some(5)), vec![10]);
        assert_eq!(pending(Some(10)), Vec::<u64>::new());
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::open(dir.path()).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::open(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::SourceInit { .. }));
    }

    #[test]
    fn test_duplicate_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.up.sql", "");
        write(dir.path(), "0001_b.up.sql", "");
        let err = FileSource::open(dir.path()).unwrap_err();
        assert!(matches!(&err, Error::SourceInit { reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn test_out_of_range_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_ok.up.sql", "");
        write(dir.path(), "9223372036854775808_huge.up.sql", "");
        let err = FileSource::open(dir.path()).unwrap_err();
        assert!(matches!(
            &err,
            Error::SourceInit { reason, .. } if reason.contains("out of range")
        ));
    }

    #[test]
    fn test_malformed_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_ok.up.sql", "");
        write(dir.path(), "latest.up.sql", "");
        assert!(matches!(
            FileSource::open(dir.path()),
            Err(Error::SourceInit { .. })
        ));
    }
}
