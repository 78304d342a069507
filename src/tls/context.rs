//! Shared TLS client context
//!
//! One [`TlsContext`] is created at startup and shared by every connection
//! through an `Arc`. Its configuration is read-only after `init`; it also
//! counts the sessions that are currently open.

use super::config::{check_library_version, TlsConfig, TlsError, TrustStore};
use super::verify::VerifyPolicy;
use super::TlsVersion;
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslSessionCacheMode, SslVerifyMode};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trusted CAs, default priority and verification policy for all sessions
pub struct TlsContext {
    config: TlsConfig,
    trust: TrustStore,
    ssl_ctx: SslContext,
    open_sessions: AtomicUsize,
}

impl TlsContext {
    /// Check the library, load the CA bundle and build the shared context
    pub fn init(config: TlsConfig) -> Result<Arc<Self>, TlsError> {
        check_library_version()?;

        let trust = TrustStore::load(&config.ca_file)?;
        let ssl_ctx = build_ssl_context(&trust, &config.priority, config.min_version)?;

        info!(
            "Loaded {} trusted CA certificates from {}",
            trust.len(),
            trust.path().display()
        );

        Ok(Arc::new(TlsContext {
            config,
            trust,
            ssl_ctx,
            open_sessions: AtomicUsize::new(0),
        }))
    }

    /// Like [`TlsContext::init`], but terminates the process on failure
    pub fn init_or_exit(config: TlsConfig) -> Arc<Self> {
        match Self::init(config) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("TLS initialization failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    /// Release the context at shutdown
    ///
    /// Releasing the context while sessions are still open is a programmer
    /// error and is logged. Closed client handles do not count.
    pub fn exit(self: Arc<Self>) {
        let open = self.open_sessions();
        if open > 0 {
            warn!("TLS context released with {} session(s) still open", open);
        }
        debug!("TLS context released");
    }

    /// Number of established sessions not yet closed or dropped
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    pub fn verify_policy(&self) -> VerifyPolicy {
        self.config.verify_policy
    }

    /// OpenSSL context for a new session
    ///
    /// Sessions using the default priority share the prebuilt context; an
    /// override builds a dedicated one over the same trust store.
    pub(crate) fn ssl_context(&self, priority: Option<&str>) -> Result<SslContext, TlsError> {
        match priority {
            Some(p) if p != self.config.priority => {
                build_ssl_context(&self.trust, p, self.config.min_version)
            }
            _ => Ok(self.ssl_ctx.clone()),
        }
    }
}

/// Counts one established session against its context until dropped
pub(crate) struct SessionGuard {
    ctx: Arc<TlsContext>,
}

impl SessionGuard {
    pub(crate) fn new(ctx: Arc<TlsContext>) -> Self {
        ctx.open_sessions.fetch_add(1, Ordering::AcqRel);
        SessionGuard { ctx }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.ctx.open_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("config", &self.config)
            .field("trusted_cas", &self.trust.len())
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}

fn build_ssl_context(
    trust: &TrustStore,
    priority: &str,
    min_version: Option<TlsVersion>,
) -> Result<SslContext, TlsError> {
    let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;

    builder
        .set_cipher_list(priority)
        .map_err(|source| TlsError::InvalidPriority {
            priority: priority.to_string(),
            source,
        })?;

    if let Some(version) = min_version {
        builder.set_min_proto_version(Some(version.to_openssl_version()))?;
    }

    builder.set_cert_store(trust.to_x509_store()?);
    builder.set_verify(SslVerifyMode::PEER);
    builder.set_session_cache_mode(SslSessionCacheMode::OFF);

    Ok(builder.build())
}
