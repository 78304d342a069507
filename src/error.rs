//! Transport errors and their stable codes

use crate::tcp::TcpError;
use crate::tls::{CertStatus, TlsError};
use std::fmt;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport operation errors
///
/// Each variant identifies the phase that failed so the caller can log it
/// and pick its own retry schedule.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("TCP error: {0}")]
    Tcp(#[from] TcpError),

    #[error("TLS error: {0}")]
    Tls(#[source] TlsError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed setting SNI server name '{name}': {reason}")]
    SniError { name: String, reason: String },

    #[error("Invalid TLS priority string '{priority}': {source}")]
    InvalidRequest {
        priority: String,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("SSL handshake with {name} failed: {reason}")]
    FailedConnect {
        name: String,
        reason: String,
        /// Certificate flags seen before the handshake aborted
        status: CertStatus,
    },

    #[error("Failed getting server certificate: {0}")]
    FailedGettingCert(String),

    #[error("HTTPS send failed: {0}")]
    SendError(#[source] openssl::ssl::Error),

    #[error("HTTPS receive failed: {0}")]
    RecvError(#[source] openssl::ssl::Error),
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Self {
        match err {
            TlsError::InvalidPriority { priority, source } => {
                Error::InvalidRequest { priority, source }
            }
            other => Error::Tls(other),
        }
    }
}

impl Error {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Tcp(e) => match e {
                TcpError::InvalidRemoteAddr { .. } => ErrorCode::IpInvalidRemoteAddr,
                TcpError::ConnectFailed { .. } => ErrorCode::IpConnectFailed,
                TcpError::Socket(_) => ErrorCode::IpSocketError,
                TcpError::Send(_) => ErrorCode::IpSendError,
                TcpError::Recv(_) => ErrorCode::IpRecvError,
                TcpError::Close(_) => ErrorCode::IpCloseError,
                TcpError::NotConnected => ErrorCode::IpObjectNotInitialized,
            },
            Error::Tls(_) => ErrorCode::TlsInitFailed,
            Error::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Error::SniError { .. } => ErrorCode::HttpsSniError,
            Error::InvalidRequest { .. } => ErrorCode::HttpsInvalidRequest,
            Error::FailedConnect { .. } => ErrorCode::HttpsFailedConnect,
            Error::FailedGettingCert(_) => ErrorCode::HttpsFailedGettingCert,
            Error::SendError(_) => ErrorCode::HttpsSendError,
            Error::RecvError(_) => ErrorCode::HttpsRecvError,
        }
    }
}

/// Error codes reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    HttpsSniError,
    HttpsInvalidRequest,
    HttpsFailedConnect,
    HttpsFailedGettingCert,
    HttpsSendError,
    HttpsRecvError,
    TlsInitFailed,
    InvalidConfig,
    IpInvalidRemoteAddr,
    IpConnectFailed,
    IpSocketError,
    IpSendError,
    IpRecvError,
    IpCloseError,
    IpObjectNotInitialized,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::HttpsSniError => "HTTPS_SNI_ERROR",
            ErrorCode::HttpsInvalidRequest => "HTTPS_INVALID_REQUEST",
            ErrorCode::HttpsFailedConnect => "HTTPS_FAILED_CONNECT",
            ErrorCode::HttpsFailedGettingCert => "HTTPS_FAILED_GETTING_CERT",
            ErrorCode::HttpsSendError => "HTTPS_SEND_ERROR",
            ErrorCode::HttpsRecvError => "HTTPS_RECV_ERROR",
            ErrorCode::TlsInitFailed => "TLS_INIT_FAILED",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::IpInvalidRemoteAddr => "IP_INVALID_REMOTE_ADDR",
            ErrorCode::IpConnectFailed => "IP_CONNECT_FAILED",
            ErrorCode::IpSocketError => "IP_SOCKET_ERROR",
            ErrorCode::IpSendError => "IP_SEND_ERROR",
            ErrorCode::IpRecvError => "IP_RECV_ERROR",
            ErrorCode::IpCloseError => "IP_CLOSE_ERROR",
            ErrorCode::IpObjectNotInitialized => "IP_OBJECT_NOT_INITIALIZED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
