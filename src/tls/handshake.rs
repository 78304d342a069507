//! TLS handshake driver
//!
//! The handshake and all record I/O run in the same retry loop: transient
//! interruptions are retried immediately, anything else ends the loop.

use openssl::ssl::{self, ErrorCode, Ssl, SslStream};
use std::io;
use std::net::TcpStream;

/// Errors that may be retried without any state change
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ssl::Error {
    fn is_transient(&self) -> bool {
        is_transient_code(self.code(), self.io_error().map(io::Error::kind))
    }
}

impl Transient for io::Error {
    fn is_transient(&self) -> bool {
        self.kind() == io::ErrorKind::Interrupted
    }
}

/// `WANT_READ`/`WANT_WRITE` caused by a socket timeout are not transient:
/// the socket is blocking, so they only occur when the timeout fires.
fn is_transient_code(code: ErrorCode, io_kind: Option<io::ErrorKind>) -> bool {
    match io_kind {
        Some(kind) => kind == io::ErrorKind::Interrupted,
        None => code == ErrorCode::WANT_READ || code == ErrorCode::WANT_WRITE,
    }
}

/// Run `op` until it succeeds or fails with a non-transient error
pub fn retry<T, E, F>(mut op: F) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Result<T, E>,
{
    loop {
        match op() {
            Err(e) if e.is_transient() => continue,
            result => return result,
        }
    }
}

/// Perform the client handshake over a connected socket
pub fn connect(ssl: Ssl, stream: TcpStream) -> Result<SslStream<TcpStream>, ssl::Error> {
    let mut stream = SslStream::new(ssl, stream)?;
    retry(|| stream.connect())?;
    Ok(stream)
}
