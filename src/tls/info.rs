//! Negotiated session parameters
//!
//! Captured once after the handshake for logging and introspection.

use super::cert::{peer_leaf, CertInfo};
use openssl::ssl::{NameType, SslRef};
use std::fmt;

/// TLS session descriptor available after handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent in the ClientHello
    pub servername: Option<String>,

    /// Peer leaf certificate
    pub peer: Option<CertInfo>,
}

impl SessionInfo {
    /// Capture the session parameters of an established connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        SessionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl
                .servername(NameType::HOST_NAME)
                .map(|s| s.to_string()),
            peer: peer_leaf(ssl),
        }
    }
}

impl fmt::Display for SessionInfo {
    /// Short descriptor, e.g. `(TLSv1.3)-(TLS_AES_256_GCM_SHA384)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-({})", self.version, self.cipher)
    }
}
