//! TLS support for HTTPS connections
//!
//! This module wraps an already-connected TCP socket in an OpenSSL client
//! session, verifies the peer and exposes length-bounded record I/O.
//!
//! # Architecture
//!
//! 1. `TlsConfig` defines the CA bundle, cipher priority and verify policy
//! 2. `TlsContext` loads the trust store once and is shared by all sessions
//! 3. `PendingSession` binds a new `Ssl` to a server name (SNI + hostname check)
//! 4. `TlsSession` is the established connection used for send/recv/close
//!
//! Peer verification is done by a per-session callback (see [`verify`]):
//! an untrusted chain or a hostname mismatch aborts the handshake, while
//! expired, not-yet-valid, revoked and unknown-signer certificates only
//! produce warnings under the default policy.
//!
//! # Examples
//!
//! ```no_run
//! use ddns_https::tls::{PendingSession, TlsConfig, TlsContext};
//! use std::net::TcpStream;
//!
//! let config = TlsConfig::client()
//!     .ca_file("/etc/ssl/certs/ca-certificates.crt")
//!     .build()
//!     .unwrap();
//! let ctx = TlsContext::init(config).unwrap();
//!
//! let pending = PendingSession::new(&ctx, "example.com", None).unwrap();
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let mut session = pending.handshake(tcp_stream).unwrap();
//!
//! session.send(b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n").unwrap();
//! let mut buf = vec![0u8; 4096];
//! let n = session.recv(&mut buf).unwrap();
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//! session.close();
//! ```

pub mod cert;
pub mod config;
pub mod context;
pub mod handshake;
pub mod info;
pub mod session;
pub mod verify;

pub use cert::CertInfo;
pub use config::{
    ClientConfigBuilder, TlsConfig, TlsError, TlsVersion, TrustStore, DEFAULT_CA_FILE,
    DEFAULT_PRIORITY,
};
pub use context::TlsContext;
pub use info::SessionInfo;
pub use session::{PendingSession, TlsSession};
pub use verify::{CertStatus, VerifyPolicy};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
