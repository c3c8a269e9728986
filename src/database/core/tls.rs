//! TLS trust configuration
//!
//! A [`TlsTrustConfig`] is built from a PEM bundle of trust anchors and only
//! accepts TLS 1.3 peers whose chains end in one of those anchors. The system
//! trust store is never consulted.
//!
//! Configurations are resolved by name through a [`TlsRegistry`] owned by the
//! connection builder, so a connection string can reference one with
//! `tls_config=<name>`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use tracing::debug;

use crate::error::Error;

/// Name the builder registers a trust anchor configuration under.
pub const DEFAULT_TLS_NAME: &str = "default_tls_name";

/// Trusted roots plus a TLS 1.3 protocol floor.
#[derive(Debug, Clone)]
pub struct TlsTrustConfig {
    client_config: Arc<ClientConfig>,
    anchors: usize,
}

impl TlsTrustConfig {
    /// Read a PEM bundle from disk and build a trust configuration from it.
    pub fn from_pem_file(path: &Path) -> Result<Self, Error> {
        let pem = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// Build a trust configuration from PEM-encoded certificates.
    ///
    /// Blocks that are not certificates, and certificates that fail to parse,
    /// are skipped. If nothing usable remains the input is rejected rather
    /// than falling back to default trust.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let mut roots = RootCertStore::empty();
        let certs = CertificateDer::pem_slice_iter(pem).filter_map(|item| match item {
            Ok(cert) => Some(cert),
            Err(e) => {
                debug!("skipping unreadable pem section: {}", e);
                None
            }
        });
        let (valid, invalid) = roots.add_parsable_certificates(certs);
        if invalid > 0 {
            debug!(valid, invalid, "ignored certificates that failed to parse");
        }
        if valid == 0 {
            return Err(Error::config("failed to append pem file"));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let client_config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| Error::config(format!("failed to build tls config: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(TlsTrustConfig {
            client_config: Arc::new(client_config),
            anchors: valid,
        })
    }

    /// Number of trust anchors loaded
    pub fn anchor_count(&self) -> usize {
        self.anchors
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    /// An owned copy of the rustls configuration for handing to an HTTP client.
    pub(crate) fn to_client_config(&self) -> ClientConfig {
        self.client_config.as_ref().clone()
    }
}

/// Named trust configurations available to connection strings.
#[derive(Debug, Clone, Default)]
pub struct TlsRegistry {
    configs: HashMap<String, TlsTrustConfig>,
}

impl TlsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` under `name`.
    ///
    /// The name ends up in a URL query, so it is limited to ASCII
    /// alphanumerics, `_`, `-` and `.`. Registering an existing name replaces
    /// the previous configuration.
    pub fn register(&mut self, name: &str, config: TlsTrustConfig) -> Result<(), Error> {
        if !is_valid_name(name) {
            return Err(Error::config(format!(
                "invalid tls config name '{}'",
                name
            )));
        }
        if self.configs.insert(name.to_string(), config).is_some() {
            debug!(name, "replaced registered tls config");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TlsTrustConfig> {
        self.configs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
