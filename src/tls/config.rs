//! TLS configuration
//!
//! This module provides the client configuration builder, the trust store
//! loader and the TLS error type.

use super::verify::VerifyPolicy;
use openssl::ssl::SslVersion;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::X509;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Canonical CA bundle location
pub const DEFAULT_CA_FILE: &str = "/etc/ssl/certs/ca-certificates.crt";

/// OpenSSL cipher string with widely interoperable, contemporary defaults
pub const DEFAULT_PRIORITY: &str = "DEFAULT";

/// Oldest supported OpenSSL release (1.1.1)
pub const MIN_OPENSSL_VERSION: i64 = 0x1010_1000;

/// Lowest protocol version a session may negotiate
///
/// Only TLS 1.2 and later can be selected as a floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    pub fn to_openssl_version(self) -> SslVersion {
        match self {
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls12 => f.write_str("TLSv1.2"),
            TlsVersion::Tls13 => f.write_str("TLSv1.3"),
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Accepts `TLSv1.2`, `tls1.3`, `1.2` and similar spellings
    fn from_str(s: &str) -> Result<Self, TlsError> {
        let lower = s.trim().to_ascii_lowercase();
        let number = lower
            .strip_prefix("tlsv")
            .or_else(|| lower.strip_prefix("tls"))
            .unwrap_or(&lower);

        match number {
            "1.2" => Ok(TlsVersion::Tls12),
            "1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Unsupported minimum TLS version: {0}")]
    InvalidVersion(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("OpenSSL {found} is too old, {required} or later is required")]
    LibraryTooOld {
        found: String,
        required: &'static str,
    },

    #[error("Failed loading trusted CA certificates from {}: {reason}", path.display())]
    TrustStore { path: PathBuf, reason: String },

    #[error("Syntax error in TLS priority string '{priority}': {source}")]
    InvalidPriority {
        priority: String,
        #[source]
        source: openssl::error::ErrorStack,
    },
}

/// Verify that the linked OpenSSL is recent enough
pub fn check_library_version() -> Result<(), TlsError> {
    check_version_number(openssl::version::number())
}

fn check_version_number(number: i64) -> Result<(), TlsError> {
    if number < MIN_OPENSSL_VERSION {
        return Err(TlsError::LibraryTooOld {
            found: openssl::version::version().to_string(),
            required: "OpenSSL 1.1.1",
        });
    }
    Ok(())
}

/// Parsed set of trusted CA certificates
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
    certs: Vec<X509>,
}

impl TrustStore {
    /// Load a PEM bundle
    ///
    /// A missing, unreadable or empty bundle is an error: TLS is never
    /// silently left without trust anchors.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TlsError> {
        let path = path.as_ref().to_path_buf();
        let store_err = |reason: String| TlsError::TrustStore {
            path: path.clone(),
            reason,
        };

        let pem = fs::read(&path).map_err(|e| store_err(e.to_string()))?;
        let certs = X509::stack_from_pem(&pem).map_err(|e| store_err(e.to_string()))?;
        if certs.is_empty() {
            return Err(store_err("no certificates found".to_string()));
        }

        Ok(TrustStore { path, certs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Build an OpenSSL certificate store holding every CA
    pub fn to_x509_store(&self) -> Result<X509Store, TlsError> {
        let mut builder = X509StoreBuilder::new()?;
        for cert in &self.certs {
            builder.add_cert(cert.clone())?;
        }
        Ok(builder.build())
    }
}

/// TLS client configuration (immutable after building)
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub(crate) ca_file: PathBuf,
    pub(crate) priority: String,
    pub(crate) verify_policy: VerifyPolicy,
    pub(crate) min_version: Option<TlsVersion>,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn ca_file(&self) -> &Path {
        &self.ca_file
    }

    pub fn priority(&self) -> &str {
        &self.priority
    }

    pub fn verify_policy(&self) -> VerifyPolicy {
        self.verify_policy
    }

    pub fn min_version(&self) -> Option<TlsVersion> {
        self.min_version
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            ca_file: PathBuf::from(DEFAULT_CA_FILE),
            priority: DEFAULT_PRIORITY.to_string(),
            verify_policy: VerifyPolicy::default(),
            min_version: None,
        }
    }
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    config: TlsConfig,
}

impl ClientConfigBuilder {
    fn new() -> Self {
        ClientConfigBuilder {
            config: TlsConfig::default(),
        }
    }

    /// Load trusted CAs from this PEM bundle instead of [`DEFAULT_CA_FILE`]
    pub fn ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.ca_file = path.as_ref().to_path_buf();
        self
    }

    /// Set the default cipher priority string for all sessions
    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.config.priority = priority.into();
        self
    }

    /// Set the certificate verification policy
    pub fn verify_policy(mut self, policy: VerifyPolicy) -> Self {
        self.config.verify_policy = policy;
        self
    }

    /// Refuse protocol versions older than `version`
    pub fn min_version(mut self, version: TlsVersion) -> Self {
        self.config.min_version = Some(version);
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if self.config.priority.trim().is_empty() {
            return Err(TlsError::InvalidConfig(
                "empty TLS priority string".to_string(),
            ));
        }
        Ok(self.config)
    }
}
