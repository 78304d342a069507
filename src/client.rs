//! HTTPS-capable client connection
//!
//! [`HttpsClient`] gives the HTTP layer one byte-stream interface over either
//! a plain TCP connection or a TLS session, chosen once per handle.

use crate::tcp::{TcpTransport, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_TIMEOUT};
use crate::tls::{CertStatus, PendingSession, SessionInfo, TlsContext, TlsSession};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    remote_name: String,
    host: Option<String>,
    port: Option<u16>,
    tls_enabled: bool,
    timeout: Option<Duration>,
    priority: Option<String>,
}

impl ClientConfig {
    /// Plaintext connection to `remote_name`
    pub fn new(remote_name: impl Into<String>) -> Self {
        ClientConfig {
            remote_name: remote_name.into(),
            host: None,
            port: None,
            tls_enabled: false,
            timeout: Some(DEFAULT_TIMEOUT),
            priority: None,
        }
    }

    /// Enable or disable TLS
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Connect to `host` instead of the remote name
    ///
    /// The remote name is still used for SNI and certificate checks.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Use `port` instead of 80 (plaintext) or 443 (TLS)
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Socket timeout for connect, send and receive
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cipher priority string for this connection only
    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_enabled
    }

    /// Address the TCP connection goes to
    pub fn connect_host(&self) -> &str {
        self.host.as_deref().unwrap_or(&self.remote_name)
    }

    /// Port the TCP connection goes to
    pub fn connect_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.tls_enabled => DEFAULT_HTTPS_PORT,
            None => DEFAULT_HTTP_PORT,
        }
    }
}

/// Client connection handle
///
/// Operations must be called in the order `open`, (`send`/`recv`)*, `close`.
#[derive(Debug)]
pub struct HttpsClient {
    config: ClientConfig,
    tls: Option<Arc<TlsContext>>,
    tcp: TcpTransport,
    session: Option<TlsSession>,
}

impl HttpsClient {
    /// Create an unopened handle
    ///
    /// A TLS handle needs the shared context and a non-empty remote name.
    pub fn new(config: ClientConfig, tls: Option<Arc<TlsContext>>) -> Result<Self> {
        if config.tls_enabled {
            if config.remote_name.is_empty() {
                return Err(Error::InvalidConfig(
                    "remote name must not be empty when TLS is enabled".to_string(),
                ));
            }
            if tls.is_none() {
                return Err(Error::InvalidConfig(
                    "TLS enabled but no TLS context given".to_string(),
                ));
            }
        }

        let mut tcp = TcpTransport::new(config.connect_host(), config.connect_port());
        tcp.set_timeout(config.timeout);

        Ok(HttpsClient {
            config,
            tls,
            tcp,
            session: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_tls(&self) -> bool {
        self.config.tls_enabled
    }

    /// Whether `open` succeeded and `close` has not been called
    pub fn is_open(&self) -> bool {
        if self.config.tls_enabled {
            self.session.is_some()
        } else {
            self.tcp.is_connected()
        }
    }

    /// Negotiated TLS parameters, while a session is open
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(TlsSession::info)
    }

    /// Certificate flags tolerated during the handshake
    pub fn cert_status(&self) -> Option<CertStatus> {
        self.session.as_ref().map(TlsSession::cert_status)
    }

    /// Connect, and with TLS enabled perform the handshake
    ///
    /// `msg` prefixes log lines to identify the caller's operation.
    pub fn open(&mut self, msg: &str) -> Result<()> {
        if self.is_open() {
            return Err(Error::InvalidConfig("connection already open".to_string()));
        }

        if !self.config.tls_enabled {
            return self.tcp.init(msg).map_err(Error::from);
        }

        let ctx = self
            .tls
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("TLS enabled but no TLS context given".to_string()))?;

        info!("{}, initiating HTTPS ...", msg);
        let pending = PendingSession::new(
            ctx,
            &self.config.remote_name,
            self.config.priority.as_deref(),
        )?;

        self.tcp.set_port(self.config.connect_port());
        self.tcp.init(msg)?;

        let stream = match self.tcp.try_clone_stream() {
            Ok(stream) => stream,
            Err(e) => {
                self.abort_tcp();
                return Err(e.into());
            }
        };

        match pending.handshake(stream) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.abort_tcp();
                Err(e)
            }
        }
    }

    // Release the socket after a failed open; the open error takes precedence
    fn abort_tcp(&mut self) {
        if let Err(e) = self.tcp.close() {
            debug!(
                "Closing connection to {}:{} after failed open: {}",
                self.tcp.host(),
                self.tcp.port(),
                e
            );
        }
    }

    /// Send the whole buffer
    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.send(buf),
            None => self.tcp.send(buf).map_err(Error::from),
        }
    }

    /// Receive a response into `buf`, returning the number of bytes read
    ///
    /// Plain connections read until the peer closes or `buf` is full. TLS
    /// sessions perform at most two record reads.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.session.as_mut() {
            Some(session) => session.recv(buf),
            None => self.tcp.recv(buf).map_err(Error::from),
        }
    }

    /// Tear down the session, if any, then close the TCP connection
    ///
    /// TLS shutdown is best effort; the returned status is the TCP close.
    pub fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.close();
        }

        debug!(
            "Closing connection to {}:{}",
            self.tcp.host(),
            self.tcp.port()
        );
        self.tcp.close().map_err(Error::from)
    }
}
