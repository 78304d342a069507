//! Peer certificate verification policy
//!
//! OpenSSL calls back into this module once per verification error and once
//! per certificate in the chain. Each error is classified into [`CertStatus`]
//! flags. Stale-trust-store conditions (unknown signer, revoked, expired, not
//! yet valid) are only warnings under the default policy. An untrusted chain
//! or a hostname mismatch always aborts the handshake.

use openssl::x509::{X509StoreContextRef, X509VerifyResult, X509};
use std::fmt;
use std::ops::BitOr;
use std::sync::Mutex;
use tracing::{error, warn};

// X509_V_ERR_* values from OpenSSL's x509_vfy.h
const X509_V_OK: i32 = 0;
const X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT: i32 = 2;
const X509_V_ERR_CERT_NOT_YET_VALID: i32 = 9;
const X509_V_ERR_CERT_HAS_EXPIRED: i32 = 10;
const X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT: i32 = 18;
const X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN: i32 = 19;
const X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY: i32 = 20;
const X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE: i32 = 21;
const X509_V_ERR_CERT_REVOKED: i32 = 23;
const X509_V_ERR_HOSTNAME_MISMATCH: i32 = 62;
const X509_V_ERR_IP_ADDRESS_MISMATCH: i32 = 64;

/// Certificate verification status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct CertStatus(u32);

impl CertStatus {
    /// The issuer of a certificate in the chain is not in the trust store
    pub const SIGNER_NOT_FOUND: CertStatus = CertStatus(1 << 0);
    /// A certificate in the chain has been revoked
    pub const REVOKED: CertStatus = CertStatus(1 << 1);
    /// A certificate in the chain has expired
    pub const EXPIRED: CertStatus = CertStatus(1 << 2);
    /// A certificate in the chain is not yet valid
    pub const NOT_ACTIVATED: CertStatus = CertStatus(1 << 3);
    /// The chain is not trusted
    pub const INVALID: CertStatus = CertStatus(1 << 4);
    /// The leaf does not cover the requested server name
    pub const HOSTNAME_MISMATCH: CertStatus = CertStatus(1 << 5);

    /// Flags the default policy only warns about
    pub const WARNINGS: CertStatus = CertStatus(
        Self::SIGNER_NOT_FOUND.0 | Self::REVOKED.0 | Self::EXPIRED.0 | Self::NOT_ACTIVATED.0,
    );

    const NAMES: [(CertStatus, &'static str); 6] = [
        (Self::SIGNER_NOT_FOUND, "signer-not-found"),
        (Self::REVOKED, "revoked"),
        (Self::EXPIRED, "expired"),
        (Self::NOT_ACTIVATED, "not-activated"),
        (Self::INVALID, "invalid"),
        (Self::HOSTNAME_MISMATCH, "hostname-mismatch"),
    ];

    pub const fn empty() -> Self {
        CertStatus(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: CertStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: CertStatus) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: CertStatus) {
        self.0 |= other.0;
    }

    /// Flags set in `self` but not in `other`
    pub const fn difference(self, other: CertStatus) -> Self {
        CertStatus(self.0 & !other.0)
    }

    /// Classify an OpenSSL verification result
    pub fn from_verify_result(result: X509VerifyResult) -> Self {
        Self::from_raw_error(result.as_raw())
    }

    /// Classify a raw `X509_V_ERR_*` code
    pub fn from_raw_error(code: i32) -> Self {
        match code {
            X509_V_OK => Self::empty(),
            X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT
            | X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
            | X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN
            | X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE => Self::SIGNER_NOT_FOUND | Self::INVALID,
            X509_V_ERR_CERT_REVOKED => Self::REVOKED,
            X509_V_ERR_CERT_HAS_EXPIRED => Self::EXPIRED,
            X509_V_ERR_CERT_NOT_YET_VALID => Self::NOT_ACTIVATED,
            X509_V_ERR_HOSTNAME_MISMATCH | X509_V_ERR_IP_ADDRESS_MISMATCH => {
                Self::HOSTNAME_MISMATCH
            }
            _ => Self::INVALID,
        }
    }
}

impl BitOr for CertStatus {
    type Output = CertStatus;

    fn bitor(self, rhs: CertStatus) -> CertStatus {
        CertStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ok");
        }

        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// How strictly peer certificates are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    /// Warn on unknown signer, revoked, expired and not-yet-valid
    #[default]
    Lenient,
    /// Every status flag is fatal
    Strict,
}

impl VerifyPolicy {
    /// Flags that abort the handshake under this policy
    pub fn fatal_flags(self) -> CertStatus {
        match self {
            VerifyPolicy::Lenient => CertStatus::INVALID | CertStatus::HOSTNAME_MISMATCH,
            VerifyPolicy::Strict => {
                CertStatus::WARNINGS | CertStatus::INVALID | CertStatus::HOSTNAME_MISMATCH
            }
        }
    }
}

/// Outcome of checking one batch of status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Reject,
}

/// Per-session verification state
///
/// Shared between the session and its verify callback. Holds the server
/// name the session was opened for and every flag seen so far.
#[derive(Debug)]
pub struct VerifyState {
    server_name: String,
    policy: VerifyPolicy,
    status: Mutex<CertStatus>,
}

impl VerifyState {
    pub fn new(server_name: impl Into<String>, policy: VerifyPolicy) -> Self {
        VerifyState {
            server_name: server_name.into(),
            policy,
            status: Mutex::new(CertStatus::empty()),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    /// All flags reported during the handshake
    pub fn status(&self) -> CertStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `flags` and decide whether the handshake may go on
    ///
    /// Warnings are logged once per session.
    pub fn record(&self, flags: CertStatus) -> Verdict {
        let fresh = {
            let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            let fresh = flags.difference(*status);
            status.insert(flags);
            fresh
        };

        if fresh.contains(CertStatus::SIGNER_NOT_FOUND) {
            warn!("The certificate does not have a known issuer.");
        }
        if fresh.contains(CertStatus::REVOKED) {
            warn!("The certificate has been revoked.");
        }
        if fresh.contains(CertStatus::EXPIRED) {
            warn!("The certificate has expired.");
        }
        if fresh.contains(CertStatus::NOT_ACTIVATED) {
            warn!("The certificate is not yet activated.");
        }

        if flags.contains(CertStatus::INVALID) {
            error!("The certificate is not trusted.");
            return Verdict::Reject;
        }

        if flags.contains(CertStatus::HOSTNAME_MISMATCH) {
            error!(
                "The certificate's owner does not match the hostname '{}'",
                self.server_name
            );
            return Verdict::Reject;
        }

        if flags.intersects(self.policy.fatal_flags()) {
            error!("Certificate rejected by strict verification policy: {}", flags);
            return Verdict::Reject;
        }

        Verdict::Continue
    }

    /// Verify callback body, see `SslRef::set_verify_callback`
    pub fn verify(&self, preverify_ok: bool, ctx: &mut X509StoreContextRef) -> bool {
        if !preverify_ok {
            let flags = CertStatus::from_verify_result(ctx.error());
            return self.record(flags) == Verdict::Continue;
        }

        if ctx.error_depth() == 0 {
            return self.check_leaf(ctx);
        }

        true
    }

    // The chain is trusted at this point; make sure a leaf exists and parses
    fn check_leaf(&self, ctx: &X509StoreContextRef) -> bool {
        let Some(leaf) = ctx.chain().and_then(|chain| chain.get(0)) else {
            error!("No certificate was found!");
            return false;
        };

        match leaf.to_der().and_then(|der| X509::from_der(&der)) {
            Ok(_) => true,
            Err(e) => {
                error!("Error while parsing certificate: {}", e);
                false
            }
        }
    }
}
