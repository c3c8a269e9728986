//! Error types
//!
//! [`Error`] is the top-level error returned by connection building and by the
//! migration runner. Each variant corresponds to the phase that failed.
//! [`QueryError`] covers a single request against the ClickHouse HTTP interface
//! and [`MigrationFailure`] covers the "apply all pending" step.

use std::path::PathBuf;

/// Top-level error for connection construction and migration runs.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or missing required input.
    #[error("{0}")]
    Config(String),

    /// Filesystem failure while reading the trust anchor file.
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The connection string could not be turned into a handle.
    #[error("invalid connection string: {0}")]
    Connection(String),

    /// The handle could not be adapted into a migration driver.
    #[error("failed to init migration db driver")]
    DriverInit(#[source] QueryError),

    /// The migration directory could not be bound as a source.
    #[error("failed to init migration source {}: {reason}", path.display())]
    SourceInit { path: PathBuf, reason: String },

    /// Applying pending migrations failed.
    #[error("failed to run migration")]
    Migration(#[source] MigrationFailure),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn source_init(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::SourceInit {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A failed request against the ClickHouse HTTP interface.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an exception.
    #[error(
        "server returned {status}{}: {message}",
        code.map(|c| format!(" (code {c})")).unwrap_or_default()
    )]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Failure of the forward "apply all pending" operation.
#[derive(thiserror::Error, Debug)]
pub enum MigrationFailure {
    #[error("failed to read current version")]
    ReadVersion(#[source] QueryError),

    /// The last recorded version was left dirty by an interrupted run.
    #[error("dirty database version {0}, fix it and force the version")]
    Dirty(u64),

    /// A migration step failed; nothing of it was recorded.
    #[error("migration {version} ({name}) failed")]
    Step {
        version: u64,
        name: String,
        #[source]
        source: QueryError,
    },

    #[error("failed to record version {version}")]
    RecordVersion {
        version: u64,
        #[source]
        source: QueryError,
    },
}

impl MigrationFailure {
    /// Version of the step the failure refers to, if any.
    pub fn version(&self) -> Option<u64> {
        match self {
            MigrationFailure::ReadVersion(_) => None,
            MigrationFailure::Dirty(v) => Some(*v),
            MigrationFailure::Step { version, .. } => Some(*version),
            MigrationFailure::RecordVersion { version, .. } => Some(*version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = QueryError::Server {
            status: 500,
            code: Some(62),
            message: "Syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "server returned 500 (code 62): Syntax error");

        let err = QueryError::Server {
            status: 403,
            code: None,
            message: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "server returned 403: denied");
    }

    #[test]
    fn test_failure_version() {
        let failure = MigrationFailure::Step {
            version: 2,
            name: "add_index".to_string(),
            source: QueryError::Decode("boom".to_string()),
        };
        assert_eq!(failure.version(), Some(2));
        assert_eq!(failure.to_string(), "migration 2 (add_index) failed");

        let failure = MigrationFailure::ReadVersion(QueryError::Decode("boom".to_string()));
        assert_eq!(failure.version(), None);
    }
}
