//! Plain TCP transport
//!
//! Blocking TCP connection used directly for plaintext HTTP and as the
//! underlying socket for TLS sessions.

use socket2::{Domain, Protocol, SockAddr, Socket, TcpKeepalive, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

/// Default plaintext HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default socket timeout for connect, read and write
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result type for TCP operations
pub type Result<T> = std::result::Result<T, TcpError>;

/// TCP transport errors
#[derive(Debug, thiserror::Error)]
pub enum TcpError {
    #[error("Invalid remote address {host}:{port}: {source}")]
    InvalidRemoteAddr {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed connecting to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Socket error: {0}")]
    Socket(#[source] io::Error),

    #[error("Send error: {0}")]
    Send(#[source] io::Error),

    #[error("Receive error: {0}")]
    Recv(#[source] io::Error),

    #[error("Close error: {0}")]
    Close(#[source] io::Error),

    #[error("Connection not initialized")]
    NotConnected,
}

/// Blocking TCP connection to a remote `(host, port)`
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Create an unconnected transport
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpTransport {
            host: host.into(),
            port,
            timeout: Some(DEFAULT_TIMEOUT),
            stream: None,
        }
    }

    /// Set the socket timeout (`None` blocks forever)
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Change the remote port, only effective before `init`
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Resolve the remote host and connect to the first address that answers
    pub fn init(&mut self, msg: &str) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TcpError::InvalidRemoteAddr {
                host: self.host.clone(),
                port: self.port,
                source,
            })?
            .collect();

        let mut last_err =
            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
        for addr in addrs {
            debug!("{}, connecting to {} ({})", msg, self.host, addr);
            match self.connect_addr(addr) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed connecting to {}: {}", addr, e);
                    last_err = e;
                }
            }
        }

        Err(TcpError::ConnectFailed {
            host: self.host.clone(),
            port: self.port,
            source: last_err,
        })
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(Duration::from_secs(60)))?;

        let addr = SockAddr::from(addr);
        match self.timeout {
            Some(timeout) => socket.connect_timeout(&addr, timeout)?,
            None => socket.connect(&addr)?,
        }

        socket.set_read_timeout(self.timeout)?;
        socket.set_write_timeout(self.timeout)?;

        Ok(socket.into())
    }

    /// Duplicate the connected socket, used as a TLS session's transport
    pub fn try_clone_stream(&self) -> Result<TcpStream> {
        self.stream
            .as_ref()
            .ok_or(TcpError::NotConnected)?
            .try_clone()
            .map_err(TcpError::Socket)
    }

    /// Send the entire buffer
    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TcpError::NotConnected)?;
        // write_all already retries on Interrupted
        stream.write_all(buf).map_err(TcpError::Send)?;
        debug!("Sent {} bytes to {}:{}", buf.len(), self.host, self.port);
        Ok(())
    }

    /// Receive until the peer closes or `buf` is full
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TcpError::NotConnected)?;
        let mut total = 0;

        while total < buf.len() {
            match stream.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TcpError::Recv(e)),
            }
        }

        debug!("Received {} bytes from {}:{}", total, self.host, self.port);
        Ok(total)
    }

    /// Shut down and release the connection
    ///
    /// A transport that was never connected closes successfully.
    pub fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TcpError::Close(e)),
        }
    }
}
