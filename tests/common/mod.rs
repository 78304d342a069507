//! Shared helpers for integration tests
//!
//! Generates throwaway CAs and server certificates, runs one-shot TLS
//! servers on loopback and captures log output.

#![allow(dead_code)]

use ddns_https::tls::{TlsConfig, TlsContext, VerifyPolicy};
use ddns_https::{ClientConfig, HttpsClient};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{NameType, SslContext, SslContextBuilder, SslMethod, SslStream};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

const DAY: i64 = 24 * 60 * 60;

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "ddns-https tests").unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    name.build()
}

fn serial() -> Asn1Integer {
    let mut bn = BigNum::new().unwrap();
    bn.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    bn.to_asn1_integer().unwrap()
}

fn time_from_now(days: i64) -> Asn1Time {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    Asn1Time::from_unix(now + days * DAY).unwrap()
}

/// Certificate plus private key presented by a test server
#[derive(Clone)]
pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

/// Throwaway certificate authority
pub struct TestCa {
    pub cert: X509,
    key: PKey<Private>,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let key = new_key();
        let name = name(cn);

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&time_from_now(-1)).unwrap();
        builder.set_not_after(&time_from_now(365)).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        TestCa {
            cert: builder.build(),
            key,
        }
    }

    /// Issue a server certificate valid from `not_before` to `not_after`
    /// days relative to now
    pub fn issue_with_validity(
        &self,
        cn: &str,
        sans: &[&str],
        not_before: i64,
        not_after: i64,
    ) -> Identity {
        let key = new_key();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&serial()).unwrap();
        builder.set_subject_name(&name(cn)).unwrap();
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&time_from_now(not_before)).unwrap();
        builder.set_not_after(&time_from_now(not_after)).unwrap();

        let mut san = SubjectAlternativeName::new();
        for entry in sans {
            if entry.parse::<std::net::IpAddr>().is_ok() {
                san.ip(entry);
            } else {
                san.dns(entry);
            }
        }
        let san = san
            .build(&builder.x509v3_context(Some(&self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        Identity {
            cert: builder.build(),
            key,
        }
    }

    /// Issue a currently valid server certificate
    pub fn issue(&self, cn: &str, sans: &[&str]) -> Identity {
        self.issue_with_validity(cn, sans, -1, 30)
    }
}

/// Write `certs` to a PEM bundle file
pub fn write_bundle(certs: &[&X509]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for cert in certs {
        file.write_all(&cert.to_pem().unwrap()).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Client context trusting only `ca`
pub fn tls_context(ca: &TestCa, policy: VerifyPolicy) -> Arc<TlsContext> {
    let bundle = write_bundle(&[&ca.cert]);
    let config = TlsConfig::client()
        .ca_file(bundle.path())
        .verify_policy(policy)
        .build()
        .unwrap();
    TlsContext::init(config).unwrap()
}

/// TLS client handle for a loopback server on `port`
pub fn tls_client(ctx: &Arc<TlsContext>, remote_name: &str, port: u16) -> HttpsClient {
    let config = ClientConfig::new(remote_name)
        .tls(true)
        .host("127.0.0.1")
        .port(port)
        .timeout(Some(IO_TIMEOUT));
    HttpsClient::new(config, Some(Arc::clone(ctx))).unwrap()
}

fn server_context(identity: &Identity) -> SslContext {
    let mut builder = SslContextBuilder::new(SslMethod::tls_server()).unwrap();
    builder.set_certificate(&identity.cert).unwrap();
    builder.set_private_key(&identity.key).unwrap();
    builder.build()
}

/// What a one-shot server saw
#[derive(Debug, Default)]
pub struct ServerReport {
    /// SNI name sent by the client
    pub sni: Option<String>,
    /// Bytes returned by the handler
    pub received: Vec<u8>,
    /// Server-side handshake error, if the handshake failed
    pub handshake_error: Option<String>,
}

type Handler = Box<dyn FnOnce(&mut SslStream<TcpStream>) -> Vec<u8> + Send>;

/// TLS server accepting exactly one connection
pub struct TlsTestServer {
    pub port: u16,
    handle: JoinHandle<ServerReport>,
}

impl TlsTestServer {
    pub fn spawn<F>(identity: &Identity, handler: F) -> Self
    where
        F: FnOnce(&mut SslStream<TcpStream>) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = server_context(identity);
        let handler: Handler = Box::new(handler);

        let handle = thread::spawn(move || {
            let (tcp_stream, _) = listener.accept().unwrap();
            tcp_stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
            tcp_stream.set_write_timeout(Some(IO_TIMEOUT)).unwrap();

            let ssl = openssl::ssl::Ssl::new(&ctx).unwrap();
            match ssl.accept(tcp_stream) {
                Ok(mut stream) => {
                    let sni = stream
                        .ssl()
                        .servername(NameType::HOST_NAME)
                        .map(|s| s.to_string());
                    let received = handler(&mut stream);
                    ServerReport {
                        sni,
                        received,
                        handshake_error: None,
                    }
                }
                Err(e) => ServerReport {
                    handshake_error: Some(e.to_string()),
                    ..ServerReport::default()
                },
            }
        });

        TlsTestServer { port, handle }
    }

    /// Server that expects a `request_len` byte request and replies with
    /// `response`, then closes cleanly
    pub fn request_response(identity: &Identity, request_len: usize, response: Vec<u8>) -> Self {
        Self::spawn(identity, move |stream| {
            let mut request = vec![0u8; request_len];
            stream.read_exact(&mut request).unwrap();
            stream.write_all(&response).unwrap();
            let _ = stream.shutdown();
            wait_for_close(stream);
            request
        })
    }

    /// Server that only completes the handshake and waits for the client
    pub fn handshake_only(identity: &Identity) -> Self {
        Self::spawn(identity, |stream| {
            wait_for_close(stream);
            Vec::new()
        })
    }

    pub fn join(self) -> ServerReport {
        self.handle.join().unwrap()
    }
}

/// Drain the connection until the client closes it
pub fn wait_for_close<S: Read>(stream: &mut S) {
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

/// Plain TCP server accepting exactly one connection
pub fn spawn_tcp_server<F>(handler: F) -> (u16, JoinHandle<Vec<u8>>)
where
    F: FnOnce(&mut TcpStream) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        handler(&mut stream)
    });

    (port, handle)
}

/// In-memory log sink for `tracing`
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with every event on this thread recorded
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines logged at WARN level
    pub fn warnings(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("WARN"))
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
