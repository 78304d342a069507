//! TLS client sessions
//!
//! A session is created in two steps. [`PendingSession::new`] binds a fresh
//! `Ssl` to the shared context and the server name (SNI, hostname check,
//! verify callback). [`PendingSession::handshake`] then takes the connected
//! socket and produces an established [`TlsSession`].

use super::cert::CertInfo;
use super::config::TlsError;
use super::context::{SessionGuard, TlsContext};
use super::handshake;
use super::info::SessionInfo;
use super::verify::{CertStatus, VerifyState};
use crate::{Error, Result};
use openssl::ssl::{self, ErrorCode, Ssl, SslStream, SslVerifyMode};
use std::fmt;
use std::net::{IpAddr, TcpStream};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Session bound to its server name, waiting for a socket
pub struct PendingSession {
    ssl: Ssl,
    verify: Arc<VerifyState>,
    ctx: Arc<TlsContext>,
}

impl PendingSession {
    /// Create a client session for `server_name`
    ///
    /// `priority` overrides the context's default cipher priority string.
    pub fn new(ctx: &Arc<TlsContext>, server_name: &str, priority: Option<&str>) -> Result<Self> {
        let sni_error = |reason: String| Error::SniError {
            name: server_name.to_string(),
            reason,
        };

        if server_name.is_empty() {
            return Err(sni_error("empty server name".to_string()));
        }
        if server_name.contains('\0') {
            return Err(sni_error("server name contains a NUL byte".to_string()));
        }

        let ssl_ctx = ctx.ssl_context(priority).map_err(|e| {
            if let TlsError::InvalidPriority { priority, source } = &e {
                error!("Syntax error in TLS priority string '{}': {}", priority, source);
            }
            Error::from(e)
        })?;

        let mut ssl = Ssl::new(&ssl_ctx).map_err(TlsError::from)?;

        let verify = Arc::new(VerifyState::new(server_name, ctx.verify_policy()));
        let state = Arc::clone(&verify);
        ssl.set_verify_callback(SslVerifyMode::PEER, move |ok, store| state.verify(ok, store));

        // SNI carries DNS names only; IP literals are matched against IP SANs
        let named = match server_name.parse::<IpAddr>() {
            Ok(ip) => ssl.param_mut().set_ip(ip),
            Err(_) => ssl
                .set_hostname(server_name)
                .and_then(|()| ssl.param_mut().set_host(server_name)),
        };
        named.map_err(|e| sni_error(e.to_string()))?;

        Ok(PendingSession {
            ssl,
            verify,
            ctx: Arc::clone(ctx),
        })
    }

    pub fn server_name(&self) -> &str {
        self.verify.server_name()
    }

    /// Run the handshake over `stream`
    pub fn handshake(self, stream: TcpStream) -> Result<TlsSession> {
        let PendingSession { ssl, verify, ctx } = self;

        let stream = match handshake::connect(ssl, stream) {
            Ok(stream) => stream,
            Err(e) => {
                error!("SSL handshake with {} failed: {}", verify.server_name(), e);
                return Err(Error::FailedConnect {
                    name: verify.server_name().to_string(),
                    reason: e.to_string(),
                    status: verify.status(),
                });
            }
        };

        let info = SessionInfo::from_ssl(stream.ssl());
        let session = TlsSession {
            stream,
            verify,
            info,
            _guard: SessionGuard::new(ctx),
        };

        info!("SSL connection using: {}", session.info);
        match session.peer_certificate() {
            Ok(cert) => {
                info!("SSL server cert subject: {}", cert.subject);
                info!("SSL server cert issuer: {}", cert.issuer);
            }
            Err(e) => warn!("{}", e),
        }

        Ok(session)
    }
}

/// Established TLS session
pub struct TlsSession {
    stream: SslStream<TcpStream>,
    verify: Arc<VerifyState>,
    info: SessionInfo,
    // Counts this session as open until it is closed or dropped
    _guard: SessionGuard,
}

impl TlsSession {
    pub fn server_name(&self) -> &str {
        self.verify.server_name()
    }

    /// Negotiated parameters
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Verification flags tolerated during the handshake
    pub fn cert_status(&self) -> CertStatus {
        self.verify.status()
    }

    /// The peer's leaf certificate
    pub fn peer_certificate(&self) -> Result<CertInfo> {
        self.info
            .peer
            .clone()
            .ok_or_else(|| Error::FailedGettingCert("no peer certificate presented".to_string()))
    }

    /// Send the whole buffer, spanning as many records as needed
    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            let n = handshake::retry(|| self.stream.ssl_write(&buf[written..]))
                .map_err(Error::SendError)?;
            written += n;
        }

        debug!("Successfully sent {} bytes using HTTPS", written);
        Ok(())
    }

    /// Receive a response in at most two reads
    ///
    /// The first read usually returns the response header record and the
    /// second the body. This does not loop until EOF: the whole response
    /// must fit in `buf`.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut len = self.read_record(buf).map_err(Error::RecvError)?;
        if len < buf.len() {
            len += self
                .read_record(&mut buf[len..])
                .map_err(Error::RecvError)?;
        }

        debug!("Successfully received {} bytes using HTTPS", len);
        Ok(len)
    }

    // A clean close_notify or a bare transport EOF both read as 0 bytes
    fn read_record(&mut self, buf: &mut [u8]) -> std::result::Result<usize, ssl::Error> {
        match handshake::retry(|| self.stream.ssl_read(&mut *buf)) {
            Ok(n) => Ok(n),
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Ok(0),
            Err(e) if e.code() == ErrorCode::SYSCALL && e.io_error().is_none() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Send close_notify and destroy the session
    ///
    /// Does not wait for the peer's close_notify. Errors are not reported.
    pub fn close(mut self) {
        match self.stream.shutdown() {
            Ok(_) => debug!("Sent TLS close_notify to {}", self.server_name()),
            Err(e) => debug!("TLS shutdown with {} failed: {}", self.server_name(), e),
        }
    }
}

impl fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSession")
            .field("server_name", &self.server_name())
            .field("info", &self.info)
            .field("cert_status", &self.cert_status())
            .finish()
    }
}
