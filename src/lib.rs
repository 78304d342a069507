//! ddns-https - TLS-capable transport for a dynamic DNS client
//!
//! This crate gives an HTTP client one byte-stream interface (open, send,
//! receive, close) over either plain TCP or an OpenSSL client session,
//! selected per connection.
//!
//! # Examples
//!
//! ```no_run
//! use ddns_https::tls::{TlsConfig, TlsContext};
//! use ddns_https::{ClientConfig, HttpsClient};
//!
//! let tls = TlsContext::init_or_exit(TlsConfig::client().build().unwrap());
//!
//! let config = ClientConfig::new("members.example.com").tls(true);
//! let mut client = HttpsClient::new(config, Some(tls.clone())).unwrap();
//!
//! client.open("Updating DDNS").unwrap();
//! client
//!     .send(b"GET /nic/update HTTP/1.0\r\nHost: members.example.com\r\n\r\n")
//!     .unwrap();
//!
//! let mut buf = vec![0u8; 8192];
//! let n = client.recv(&mut buf).unwrap();
//! println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//! client.close().unwrap();
//! tls.exit();
//! ```

pub mod client;
pub mod error;
pub mod tcp;
pub mod tls;

pub use client::{ClientConfig, HttpsClient};
pub use error::{Error, ErrorCode, Result};
pub use tcp::{TcpError, TcpTransport};
