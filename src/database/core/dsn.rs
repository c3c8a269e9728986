//! Connection string parsing
//!
//! Connection strings are URLs pointing at the ClickHouse HTTP interface:
//!
//! ```text
//! clickhouse://host:8123?username=default&password=secret&database=analytics
//! https://host:8443/?database=analytics&tls_config=default_tls_name
//! ```
//!
//! `username` (or `user`), `password`, `database`, `secure`, `skip_verify` and
//! `tls_config` are interpreted here. Any other query parameter is passed to
//! the server as a query setting.

use percent_encoding::percent_decode_str;
use reqwest::Url;

use crate::error::Error;

const HTTP_PORT: u16 = 8123;
const HTTPS_PORT: u16 = 8443;

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    /// Base URL requests are sent to (`scheme://host:port/path`)
    pub endpoint: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Name of a registered TLS trust configuration
    pub tls_config: Option<String>,
    pub skip_verify: bool,
    /// Remaining query parameters, forwarded as server settings
    pub settings: Vec<(String, String)>,
}

impl Dsn {
    pub fn parse(dsn: &str) -> Result<Self, Error> {
        let url = Url::parse(dsn)
            .map_err(|e| Error::Connection(format!("{}: {}", e, sanitize(dsn))))?;

        let scheme = url.scheme();
        match scheme {
            "http" | "https" | "clickhouse" => {}
            // clickhouse-go native protocol DSNs
            "tcp" | "clickhouse+native" => {
                return Err(Error::Connection(format!(
                    "unsupported scheme '{}': the native protocol is not supported, \
                     use the HTTP interface instead (e.g. http://host:8123)",
                    scheme
                )))
            }
            _ => {
                return Err(Error::Connection(format!(
                    "unsupported scheme '{}', expected http, https or clickhouse",
                    scheme
                )))
            }
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(Error::Connection("missing host".to_string())),
        };

        let mut username = decode_userinfo(url.username())?;
        let mut password = url.password().map(decode_userinfo).transpose()?.flatten();
        let mut database = None;
        let mut tls_config = None;
        let mut secure = scheme == "https";
        let mut skip_verify = false;
        let mut settings = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "username" | "user" => username = non_empty(&value),
                "password" => password = non_empty(&value),
                "database" => database = non_empty(&value),
                "tls_config" => tls_config = non_empty(&value),
                "secure" => secure = parse_bool(&key, &value)?,
                "skip_verify" => skip_verify = parse_bool(&key, &value)?,
                _ => settings.push((key.into_owned(), value.into_owned())),
            }
        }

        // a named trust configuration only makes sense over TLS
        let https = secure || tls_config.is_some();
        let (scheme, default_port) = if https {
            ("https", HTTPS_PORT)
        } else {
            ("http", HTTP_PORT)
        };
        // `Url` drops a port equal to the scheme default, e.g. `https://h:443`
        let port = url
            .port()
            .or_else(|| explicit_port(dsn))
            .unwrap_or(default_port);
        let path = if url.path().is_empty() { "/" } else { url.path() };

        let endpoint = Url::parse(&format!("{}://{}:{}{}", scheme, host, port, path))
            .map_err(|e| Error::Connection(format!("invalid endpoint: {}", e)))?;

        Ok(Dsn {
            endpoint,
            username,
            password,
            database,
            tls_config,
            skip_verify,
            settings,
        })
    }

    pub fn is_https(&self) -> bool {
        self.endpoint.scheme() == "https"
    }
}

/// Append a `tls_config=<name>` reference to the query of a connection string.
/// Any fragment is kept after the query.
pub fn append_tls_config(dsn: &str, name: &str) -> Result<String, Error> {
    let mut url = Url::parse(dsn)
        .map_err(|e| Error::Connection(format!("{}: {}", e, sanitize(dsn))))?;
    url.query_pairs_mut().append_pair("tls_config", name);
    Ok(url.to_string())
}

/// Mask credentials in a connection string so it can be logged.
pub fn sanitize(dsn: &str) -> String {
    let mut url = match Url::parse(dsn) {
        Ok(url) => url,
        Err(_) => return "<unparseable connection string>".to_string(),
    };

    if url.password().is_some() {
        // only fails for URLs without a host, which have no password either
        let _ = url.set_password(Some("***"));
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "password" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    url.to_string()
}

/// Port written in the authority of `dsn`, if any.
fn explicit_port(dsn: &str) -> Option<u16> {
    let (_, rest) = dsn.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let (host, port) = host_port.rsplit_once(':')?;
    if host.is_empty() || (host.starts_with('[') && !host.ends_with(']')) {
        return None;
    }
    port.parse().ok()
}

fn decode_userinfo(raw: &str) -> Result<Option<String>, Error> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| Error::Connection(format!("invalid credentials encoding: {}", e)))?;
    Ok(non_empty(&decoded))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(Error::Connection(format!(
            "invalid boolean for {}: '{}'",
            key, value
        ))),
    }
}
