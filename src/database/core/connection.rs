//! Database connection management
//!
//! [`ConnectionBuilder`] turns a [`ConnectionSpec`] into a [`ClickHouseConn`]
//! handle. When a trust anchor file is given, the builder loads it into a
//! [`TlsTrustConfig`], registers it under a fixed name and appends a
//! `tls_config=<name>` reference to the connection string so the handle picks
//! it up when it is opened.
//!
//! Opening a handle does not talk to the server. Reachability, credentials and
//! the TLS handshake are only exercised by the first query, so an unreachable
//! host surfaces as a migration-phase error rather than a connection-phase one.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use tracing::{debug, info};

use super::dsn::{append_tls_config, sanitize, Dsn};
use super::tls::{TlsRegistry, TlsTrustConfig, DEFAULT_TLS_NAME};
use crate::error::{Error, QueryError};

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";
const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

/// What to connect to, and which trust anchors to use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub connection_string: String,
    /// PEM bundle of trusted root certificates
    pub trust_anchor_path: Option<PathBuf>,
}

impl ConnectionSpec {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            trust_anchor_path: None,
        }
    }

    pub fn with_trust_anchor(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_anchor_path = Some(path.into());
        self
    }

    /// The trust anchor path, treating an empty path as absent.
    fn trust_anchor(&self) -> Option<&Path> {
        self.trust_anchor_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Builds [`ClickHouseConn`] handles.
///
/// The builder owns the registry of named TLS configurations its handles can
/// reference. Building twice with different trust anchors replaces the
/// configuration registered under the builder's name.
#[derive(Debug)]
pub struct ConnectionBuilder {
    registry: TlsRegistry,
    tls_name: String,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            registry: TlsRegistry::new(),
            tls_name: DEFAULT_TLS_NAME.to_string(),
        }
    }
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register trust anchors under `name` instead of [`DEFAULT_TLS_NAME`].
    pub fn with_tls_name(mut self, name: impl Into<String>) -> Self {
        self.tls_name = name.into();
        self
    }

    pub fn registry(&self) -> &TlsRegistry {
        &self.registry
    }

    /// Build a handle from `spec`.
    ///
    /// An empty connection string is rejected before any file or network
    /// access. The returned handle has not contacted the server yet.
    pub fn build(&mut self, spec: &ConnectionSpec) -> Result<ClickHouseConn, Error> {
        if spec.connection_string.trim().is_empty() {
            return Err(Error::config("empty connection string"));
        }

        let mut dsn = spec.connection_string.clone();

        if let Some(path) = spec.trust_anchor() {
            let trust = TlsTrustConfig::from_pem_file(path)?;
            info!(
                "loaded {} trust anchor(s) from {}",
                trust.anchor_count(),
                path.display()
            );
            self.registry.register(&self.tls_name, trust)?;
            dsn = append_tls_config(&dsn, &self.tls_name)?;

            let conn = ClickHouseConn::open(&dsn, &self.registry)?;
            if conn.tls_config() != Some(self.tls_name.as_str()) {
                return Err(Error::config(format!(
                    "connection string does not reference tls config '{}'",
                    self.tls_name
                )));
            }
            return Ok(conn);
        }

        ClickHouseConn::open(&dsn, &self.registry)
    }
}

/// Build a handle with a fresh [`ConnectionBuilder`].
pub fn connect(spec: &ConnectionSpec) -> Result<ClickHouseConn, Error> {
    ConnectionBuilder::new().build(spec)
}

/// Handle to a ClickHouse server, speaking its HTTP interface.
///
/// Every call is a blocking request with no client-side timeout.
pub struct ClickHouseConn {
    dsn: String,
    target: Dsn,
    client: Client,
}

impl ClickHouseConn {
    /// Open a handle, resolving any `tls_config` reference against `registry`.
    pub fn open(dsn: &str, registry: &TlsRegistry) -> Result<Self, Error> {
        let target = Dsn::parse(dsn)?;

        // connect directly, like the native drivers do
        let mut builder = Client::builder().timeout(None::<Duration>).no_proxy();
        match &target.tls_config {
            Some(name) => {
                let trust = registry.get(name).ok_or_else(|| {
                    Error::Connection(format!("tls config '{}' is not registered", name))
                })?;
                builder = builder
                    .tls_built_in_root_certs(false)
                    .use_preconfigured_tls(trust.to_client_config());
            }
            None if target.skip_verify => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            None => {}
        }

        let client = builder
            .build()
            .map_err(|e| Error::Connection(format!("failed to build http client: {}", e)))?;

        debug!(
            "opened handle for {} (endpoint {})",
            sanitize(dsn),
            target.endpoint
        );

        Ok(ClickHouseConn {
            dsn: dsn.to_string(),
            target,
            client,
        })
    }

    /// The connection string this handle was opened with, including any
    /// `tls_config` reference added by the builder.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn endpoint(&self) -> &Url {
        &self.target.endpoint
    }

    pub fn database(&self) -> Option<&str> {
        self.target.database.as_deref()
    }

    pub fn tls_config(&self) -> Option<&str> {
        self.target.tls_config.as_deref()
    }

    /// Execute a statement, discarding any output.
    pub fn execute(&self, sql: &str) -> Result<(), QueryError> {
        self.send(sql).map(|_| ())
    }

    /// Execute a query and return the raw response body.
    pub fn query(&self, sql: &str) -> Result<String, QueryError> {
        self.send(sql)
    }

    /// URL a query is posted to: the endpoint plus database and settings.
    fn query_url(&self) -> Url {
        let mut url = self.target.endpoint.clone();
        if self.target.database.is_some() || !self.target.settings.is_empty() {
            let mut pairs = url.query_pairs_mut();
            if let Some(db) = &self.target.database {
                pairs.append_pair("database", db);
            }
            for (key, value) in &self.target.settings {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn request(&self, sql: &str) -> RequestBuilder {
        let mut request = self.client.post(self.query_url()).body(sql.to_string());
        if let Some(user) = &self.target.username {
            request = request.header(USER_HEADER, user);
        }
        if let Some(password) = &self.target.password {
            request = request.header(KEY_HEADER, password);
        }
        request
    }

    fn send(&self, sql: &str) -> Result<String, QueryError> {
        debug!("executing: {}", sql.trim());
        let response = self.request(sql).send()?;

        let status = response.status();
        let header_code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let body = response.text()?;

        if !status.is_success() || header_code.is_some() {
            return Err(QueryError::Server {
                status: status.as_u16(),
                code: header_code.or_else(|| exception_code(&body)),
                message: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}

impl fmt::Debug for ClickHouseConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickHouseConn")
            .field("dsn", &sanitize(&self.dsn))
            .field("endpoint", &self.target.endpoint.as_str())
            .finish()
    }
}

/// Extract `62` from `Code: 62. DB::Exception: ...`.
fn exception_code(body: &str) -> Option<u32> {
    let rest = body.trim_start().strip_prefix("Code:")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
