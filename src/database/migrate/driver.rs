//! Migration driver
//!
//! The driver is the engine's view of the database: it reads and records the
//! applied version and executes step bodies. [`ClickHouseDriver`] keeps its
//! bookkeeping in a table compatible with the one used by golang-migrate's
//! ClickHouse driver:
//!
//! ```sql
//! CREATE TABLE schema_migrations (version Int64, dirty UInt8, sequence UInt64) Engine=TinyLog
//! ```
//!
//! The latest row by `sequence` is the current version.

use serde::Deserialize;
use tracing::debug;

use super::source::MigrationStep;
use crate::database::core::ClickHouseConn;
use crate::error::{Error, QueryError};

pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";
pub const DEFAULT_MIGRATIONS_TABLE_ENGINE: &str = "TinyLog";

/// Recorded migration state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionState {
    pub version: u64,
    /// Set when a run was interrupted while applying `version`
    pub dirty: bool,
}

/// Database side of a migration run
pub trait MigrationDriver {
    /// The latest recorded version, `None` if nothing was ever applied.
    fn version(&mut self) -> Result<Option<VersionState>, QueryError>;

    fn set_version(&mut self, version: u64, dirty: bool) -> Result<(), QueryError>;

    /// Execute the body of a single step.
    fn run(&mut self, step: &MigrationStep) -> Result<(), QueryError>;
}

/// Settings for [`ClickHouseDriver`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub migrations_table: String,
    pub migrations_table_engine: String,
    /// Create the bookkeeping table `ON CLUSTER` this cluster
    pub cluster_name: Option<String>,
    /// Split step bodies on `;` and send the statements one by one
    pub multi_statement: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            migrations_table_engine: DEFAULT_MIGRATIONS_TABLE_ENGINE.to_string(),
            cluster_name: None,
            multi_statement: true,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !is_table_name(&self.migrations_table) {
            return Err(Error::config(format!(
                "invalid migrations table name '{}'",
                self.migrations_table
            )));
        }
        let engine = self.migrations_table_engine.trim();
        if engine.is_empty() || engine.contains(';') {
            return Err(Error::config(format!(
                "invalid migrations table engine '{}'",
                self.migrations_table_engine
            )));
        }
        if let Some(cluster) = &self.cluster_name {
            let valid = !cluster.is_empty()
                && cluster
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '{' | '}'));
            if !valid {
                return Err(Error::config(format!("invalid cluster name '{}'", cluster)));
            }
        }
        Ok(())
    }

    fn create_table_sql(&self) -> String {
        let on_cluster = self
            .cluster_name
            .as_ref()
            .map(|c| format!(" ON CLUSTER {}", c))
            .unwrap_or_default();
        let engine = self.migrations_table_engine.trim();
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {}{} \
             (version Int64, dirty UInt8, sequence UInt64) Engine={}",
            self.migrations_table, on_cluster, engine
        );
        // MergeTree family engines need a sorting key
        let engine_name = engine.split('(').next().unwrap_or(engine).trim();
        if engine_name.ends_with("Tree") {
            sql.push_str(" ORDER BY sequence");
        }
        sql
    }

    fn version_sql(&self) -> String {
        format!(
            "SELECT version, dirty FROM {} ORDER BY sequence DESC LIMIT 1 \
             SETTINGS output_format_json_quote_64bit_integers = 0 FORMAT JSONEachRow",
            self.migrations_table
        )
    }

    fn set_version_sql(&self, version: u64, dirty: bool, sequence: u64) -> String {
        format!(
            "INSERT INTO {} (version, dirty, sequence) VALUES ({}, {}, {})",
            self.migrations_table,
            version,
            u8::from(dirty),
            sequence
        )
    }
}

/// [`MigrationDriver`] backed by a [`ClickHouseConn`]
pub struct ClickHouseDriver<'a> {
    conn: &'a ClickHouseConn,
    config: DriverConfig,
}

impl<'a> ClickHouseDriver<'a> {
    /// Adapt a handle into a driver, creating the bookkeeping table if needed.
    ///
    /// This is the first point at which the server is contacted.
    pub fn with_instance(conn: &'a ClickHouseConn, config: DriverConfig) -> Result<Self, Error> {
        config.validate()?;
        let driver = ClickHouseDriver { conn, config };
        driver
            .conn
            .execute(&driver.config.create_table_sql())
            .map_err(Error::DriverInit)?;
        debug!(
            "migrations table {} is ready",
            driver.config.migrations_table
        );
        Ok(driver)
    }
}

#[derive(Deserialize)]
struct VersionRow {
    version: i64,
    dirty: u8,
}

impl MigrationDriver for ClickHouseDriver<'_> {
    fn version(&mut self) -> Result<Option<VersionState>, QueryError> {
        let body = self.conn.query(&self.config.version_sql())?;
        parse_version_row(&body)
    }

    fn set_version(&mut self, version: u64, dirty: bool) -> Result<(), QueryError> {
        let now = chrono::Utc::now();
        let sequence = now.timestamp_nanos_opt().unwrap_or(i64::MAX) as u64;
        self.conn
            .execute(&self.config.set_version_sql(version, dirty, sequence))
    }

    fn run(&mut self, step: &MigrationStep) -> Result<(), QueryError> {
        let statements = if self.config.multi_statement {
            split_statements(&step.body)
        } else {
            let body = step.body.trim();
            if body.is_empty() {
                vec![]
            } else {
                vec![body.to_string()]
            }
        };

        if statements.is_empty() {
            debug!("migration {} has no statements", step);
        }
        for statement in &statements {
            self.conn.execute(statement)?;
        }
        Ok(())
    }
}

fn parse_version_row(body: &str) -> Result<Option<VersionState>, QueryError> {
    let line = match body.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line,
        None => return Ok(None),
    };
    let row: VersionRow = serde_json::from_str(line)
        .map_err(|e| QueryError::Decode(format!("invalid version row '{}': {}", line, e)))?;
    // golang-migrate records -1 for "no version"
    if row.version < 0 {
        return Ok(None);
    }
    Ok(Some(VersionState {
        version: row.version as u64,
        dirty: row.dirty != 0,
    }))
}

/// `name` or `database.name`, each part a plain identifier.
fn is_table_name(name: &str) -> bool {
    let is_ident = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    match name.split_once('.') {
        Some((db, table)) => is_ident(db) && is_ident(table),
        None => is_ident(name),
    }
}

/// Split a script on `;`, ignoring separators inside quotes and comments.
/// Statements that hold nothing but whitespace or comments are dropped.
pub fn split_statements(body: &str) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Normal,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_content = false;
    let mut state = State::Normal;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                ';' => {
                    if has_content {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_content = false;
                    continue;
                }
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    has_content = true;
                }
                '-' if chars.peek() == Some(&'-') => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    current.push(c);
                    current.push('*');
                    chars.next();
                    state = State::BlockComment;
                    continue;
                }
                c if !c.is_whitespace() => has_content = true,
                _ => {}
            },
            State::Quoted(quote) => {
                if c == '\\' {
                    current.push(c);
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                    continue;
                }
                if c == quote {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    current.push(c);
                    current.push('/');
                    chars.next();
                    state = State::Normal;
                    continue;
                }
            }
        }
        current.push(c);
    }

    if has_content {
        statements.push(current.trim().to_string());
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let body = "CREATE TABLE a (x UInt8) Engine=Memory;\n\nINSERT INTO a VALUES (1);\n";
        assert_eq!(
            split_statements(body),
            vec![
                "CREATE TABLE a (x UInt8) Engine=Memory",
                "INSERT INTO a VALUES (1)"
            ]
        );
    }

    #[test]
    fn test_split_statements_quotes_and_comments() {
        let body = r#"
            -- create; the table
            CREATE TABLE t (s String DEFAULT 'a;b') Engine=Memory;
            /* block; comment */
            INSERT INTO t VALUES ('it\'s; fine'), ("x;y");
            SELECT `odd;name` FROM t;
            -- trailing comment only
        "#;
        let statements = split_statements(body);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].ends_with("DEFAULT 'a;b') Engine=Memory"));
        assert!(statements[0].starts_with("-- create; the table"));
        assert!(statements[1].contains(r#"('it\'s; fine'), ("x;y")"#));
        assert_eq!(statements[2], "SELECT `odd;name` FROM t");
    }

    #[test]
    fn test_split_statements_empty() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("  ;\n ; -- nothing\n").is_empty());
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn test_create_table_sql() {
        let config = DriverConfig::default();
        assert_eq!(
            config.create_table_sql(),
            "CREATE TABLE IF NOT EXISTS schema_migrations \
             (version Int64, dirty UInt8, sequence UInt64) Engine=TinyLog"
        );

        let config = DriverConfig {
            migrations_table: "ops.migrations".to_string(),
            migrations_table_engine:
                "ReplicatedMergeTree('/clickhouse/{shard}/migrations', '{replica}')".to_string(),
            cluster_name: Some("{cluster}".to_string()),
            multi_statement: true,
        };
        let sql = config.create_table_sql();
        assert!(sql.starts_with(
            "CREATE TABLE IF NOT EXISTS ops.migrations ON CLUSTER {cluster} ("
        ));
        assert!(sql.ends_with("'{replica}') ORDER BY sequence"));
    }

    #[test]
    fn test_version_and_insert_sql() {
        let config = DriverConfig::default();
        assert!(config.version_sql().starts_with(
            "SELECT version, dirty FROM schema_migrations ORDER BY sequence DESC LIMIT 1"
        ));
        assert_eq!(
            config.set_version_sql(3, false, 42),
            "INSERT INTO schema_migrations (version, dirty, sequence) VALUES (3, 0, 42)"
        );
        assert_eq!(
            config.set_version_sql(4, true, 43),
            "INSERT INTO schema_migrations (version, dirty, sequence) VALUES (4, 1, 43)"
        );
    }

    #[test]
    fn test_parse_version_row() {
        assert_eq!(parse_version_row("").unwrap(), None);
        assert_eq!(
            parse_version_row("{\"version\":3,\"dirty\":0}\n").unwrap(),
            Some(VersionState {
                version: 3,
                dirty: false
            })
        );
        assert_eq!(
            parse_version_row("{\"version\":7,\"dirty\":1}").unwrap(),
            Some(VersionState {
                version: 7,
                dirty: true
            })
        );
        assert_eq!(
            parse_version_row("{\"version\":-1,\"dirty\":0}").unwrap(),
            None
        );
        assert!(matches!(
            parse_version_row("Ok."),
            Err(QueryError::Decode(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(DriverConfig::default().validate().is_ok());

        let bad_table = DriverConfig {
            migrations_table: "migrations; DROP TABLE x".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad_table.validate(), Err(Error::Config(_))));

        let bad_engine = DriverConfig {
            migrations_table_engine: " ".to_string(),
            ..Default::default()
        };
        assert!(bad_engine.validate().is_err());

        let bad_cluster = DriverConfig {
            cluster_name: Some("a b".to_string()),
            ..Default::default()
        };
        assert!(bad_cluster.validate().is_err());
    }

    #[test]
    fn test_table_name() {
        assert!(is_table_name("schema_migrations"));
        assert!(is_table_name("db._m1"));
        assert!(!is_table_name("1table"));
        assert!(!is_table_name("a.b.c"));
        assert!(!is_table_name(""));
    }
}
