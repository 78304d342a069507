//! Certificate handling and parsing
//!
//! Extracts distinguished names and subject alternative names from X.509
//! certificates for logging and introspection.

use openssl::ssl::SslRef;
use openssl::x509::{X509NameRef, X509Ref};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Certificate information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Subject distinguished name, e.g. `CN=example.com,O=Example`
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Subject Alternative Names (`DNS:` and `IP:` entries)
    pub subject_alt_names: Vec<String>,
}

impl CertInfo {
    /// Extract certificate information from an X.509 certificate
    pub fn from_x509(cert: &X509Ref) -> Self {
        CertInfo {
            subject: format_dn(cert.subject_name()),
            issuer: format_dn(cert.issuer_name()),
            subject_alt_names: subject_alt_names(cert),
        }
    }
}

/// Format a name as an RFC 4514 string
///
/// Attributes are listed most specific first, as `openssl x509 -nameopt
/// RFC2253` prints them.
pub fn format_dn(name: &X509NameRef) -> String {
    let mut parts: Vec<String> = name
        .entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| escape_dn_value(&s))
                .unwrap_or_else(|_| "<undef>".to_string());
            format!("{}={}", key, value)
        })
        .collect();

    if parts.is_empty() {
        return "<undef>".to_string();
    }

    parts.reverse();
    parts.join(",")
}

fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i == last && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn subject_alt_names(cert: &X509Ref) -> Vec<String> {
    let Some(sans) = cert.subject_alt_names() else {
        return Vec::new();
    };

    sans.iter()
        .filter_map(|name| {
            if let Some(dns) = name.dnsname() {
                return Some(format!("DNS:{}", dns));
            }

            let ip = match name.ipaddress()? {
                b if b.len() == 4 => IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(b).ok()?)),
                b if b.len() == 16 => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(b).ok()?)),
                _ => return None,
            };
            Some(format!("IP:{}", ip))
        })
        .collect()
}

/// Information about the peer's leaf certificate, if one was presented
pub fn peer_leaf(ssl: &SslRef) -> Option<CertInfo> {
    ssl.peer_certificate().map(|cert| CertInfo::from_x509(&cert))
}
