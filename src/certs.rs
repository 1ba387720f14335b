//! TLS certificate validation
//!
//! Two sources of truth for the same certificate: the cert-manager
//! managed `kubernetes.io/tls` Secret inside the cluster, and the
//! certificate actually presented on the wire by the ingress endpoint.
//! Both paths parse down to [`CertificateInfo`] and run the same expiry
//! and hostname checks. Parse failures and bad certificates are problems
//! in the report; only unusable input (a malformed URL) is an `Err`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, instrument, warn};
use url::Url;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;

use crate::cluster::{CertificateReader, SecretReader};
use crate::error::{Error, Result};
use crate::poll::{poll_until, Lookup, PollConfig, PollStep};
use crate::report::{Problem, ValidationReport};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields extracted from an X.509 certificate, enough for the expiry and
/// hostname checks plus a readable report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
}

impl CertificateInfo {
    /// Parse the first certificate of a PEM bundle (cert-manager writes
    /// the leaf first in `tls.crt`).
    pub fn from_pem(pem: &[u8]) -> Result<Self, String> {
        let (_, parsed) =
            parse_x509_pem(pem).map_err(|e| format!("Invalid PEM in tls.crt - {e}"))?;
        let cert = parsed
            .parse_x509()
            .map_err(|e| format!("Invalid certificate in tls.crt - {e}"))?;
        Self::from_cert(&cert)
    }

    /// Parse a single DER-encoded certificate, as presented on the wire.
    pub fn from_der(der: &[u8]) -> Result<Self, String> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| format!("Invalid certificate from server - {e}"))?;
        Self::from_cert(&cert)
    }

    fn from_cert(cert: &X509Certificate<'_>) -> Result<Self, String> {
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let not_before = DateTime::<Utc>::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| "Certificate notBefore out of range".to_string())?;
        let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| "Certificate notAfter out of range".to_string())?;

        let dns_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            common_name,
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            dns_names,
        })
    }

    /// Whether `hostname` is covered by this certificate's DNS names,
    /// honoring single-label wildcards.
    pub fn covers_hostname(&self, hostname: &str) -> bool {
        self.dns_names.iter().any(|name| dns_name_matches(name, hostname))
    }

    pub fn is_lets_encrypt(&self) -> bool {
        self.issuer.contains("Let's Encrypt")
    }
}

/// RFC 6125 style matching: exact, or a `*.` wildcard covering exactly
/// one leftmost label.
fn dns_name_matches(pattern: &str, hostname: &str) -> bool {
    if pattern.eq_ignore_ascii_case(hostname) {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some((first, rest)) = hostname.split_once('.') {
            return !first.is_empty() && rest.eq_ignore_ascii_case(suffix);
        }
    }
    false
}

fn check_validity_window(
    report: &mut ValidationReport,
    namespace: &str,
    name: &str,
    info: &CertificateInfo,
    now: DateTime<Utc>,
) {
    if info.not_before > now {
        report.push(Problem::scoped(
            namespace,
            name,
            format!("Certificate not yet valid (starts {})", info.not_before),
        ));
    }
    if info.not_after < now {
        report.push(Problem::scoped(
            namespace,
            name,
            format!("Certificate expired (ended {})", info.not_after),
        ));
    }
}

/// Validate the certificate stored in a `kubernetes.io/tls` Secret.
///
/// Checks key material presence, PEM validity, the validity window
/// against a single wall-clock reading, and coverage of
/// `expected_hostname` (SANs first, bare CN as a fallback for
/// pre-SAN issuers).
#[instrument(skip(secrets))]
pub async fn validate_certificate_secret(
    secrets: &impl SecretReader,
    namespace: &str,
    name: &str,
    expected_hostname: &str,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new();
    report.scanned = 1;

    let secret = match secrets.read_secret(namespace, name).await? {
        Lookup::Found(secret) => secret,
        Lookup::NotFound => {
            report.push(Problem::scoped(namespace, name, "Secret not found"));
            return Ok(report);
        }
    };

    // ByteString values are already base64-decoded by the API machinery.
    let data = secret.data.unwrap_or_default();
    let crt = data.get("tls.crt");
    let key = data.get("tls.key");
    if crt.is_none() {
        report.push(Problem::scoped(namespace, name, "Missing tls.crt"));
    }
    if key.is_none() {
        report.push(Problem::scoped(namespace, name, "Missing tls.key"));
    }
    let Some(crt) = crt else {
        return Ok(report);
    };

    let info = match CertificateInfo::from_pem(&crt.0) {
        Ok(info) => info,
        Err(text) => {
            report.push(Problem::scoped(namespace, name, text));
            return Ok(report);
        }
    };

    let now = Utc::now();
    check_validity_window(&mut report, namespace, name, &info, now);

    let cn_matches = info.common_name.as_deref() == Some(expected_hostname);
    if !info.covers_hostname(expected_hostname) && !cn_matches {
        report.push(Problem::scoped(
            namespace,
            name,
            format!(
                "Hostname {expected_hostname} not covered (CN={}, SANs={})",
                info.common_name.as_deref().unwrap_or("<none>"),
                info.dns_names.join(", ")
            ),
        ));
    }

    if info.is_lets_encrypt() {
        info!(namespace, secret = name, "certificate issued by Let's Encrypt");
    }
    debug!(namespace, secret = name, not_after = %info.not_after, "certificate secret parsed");
    Ok(report)
}

/// Validate the certificate an HTTPS endpoint actually presents.
///
/// Performs a TLS handshake (no request body) against the URL's host and
/// inspects the leaf certificate: validity window and SAN coverage of the
/// host. Connection or handshake failures become problems so one dead
/// endpoint does not abort a whole validation sweep; only a URL that
/// cannot be parsed is an `Err`.
#[instrument]
pub async fn validate_https_certificate(url: &str) -> Result<ValidationReport> {
    let parsed = Url::parse(url)?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::ConfigError(format!("URL has no host: {url}")))?
        .to_string();
    let port = parsed.port().unwrap_or(443);

    let mut report = ValidationReport::new();
    report.scanned = 1;

    let leaf = match fetch_leaf_certificate(&host, port).await {
        Ok(der) => der,
        Err(text) => {
            report.push(Problem::new(format!("{host}: {text}")));
            return Ok(report);
        }
    };

    let info = match CertificateInfo::from_der(&leaf) {
        Ok(info) => info,
        Err(text) => {
            report.push(Problem::new(format!("{host}: {text}")));
            return Ok(report);
        }
    };

    let now = Utc::now();
    if info.not_before > now {
        report.push(Problem::new(format!(
            "{host}: Certificate not yet valid (starts {})",
            info.not_before
        )));
    }
    if info.not_after < now {
        report.push(Problem::new(format!(
            "{host}: Certificate expired (ended {})",
            info.not_after
        )));
    }

    // No CN fallback on the live path; modern issuance always sets SANs.
    if !info.covers_hostname(&host) {
        report.push(Problem::new(format!(
            "{host}: Hostname not covered (SANs={})",
            info.dns_names.join(", ")
        )));
    }

    if info.is_lets_encrypt() {
        info!(%host, "endpoint serves a Let's Encrypt certificate");
    }
    Ok(report)
}

/// Handshake with `host:port` and return the leaf certificate in DER.
async fn fetch_leaf_certificate(host: &str, port: u16) -> Result<Vec<u8>, String> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| format!("Invalid server name {host}"))?;

    let connect = async {
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| format!("Connection failed - {e}"))?;
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| format!("TLS handshake failed - {e}"))
    };

    let stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect)
        .await
        .map_err(|_| format!("TLS handshake timed out after {HANDSHAKE_TIMEOUT:?}"))??;

    let (_, session) = stream.get_ref();
    session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec())
        .ok_or_else(|| "Server presented no certificate".to_string())
}

/// Wait for a cert-manager Certificate to report `Ready=True`.
///
/// Issuance involves an ACME round trip, so this uses a 10-minute budget
/// at 10s intervals rather than the standard reconcile profile.
#[instrument(skip(certs))]
pub async fn wait_for_certificate_ready(
    certs: &impl CertificateReader,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    let config = PollConfig::new(Duration::from_secs(600), Duration::from_secs(10));
    let outcome = poll_until(config, || async move {
        match certs.get_certificate(namespace, name).await? {
            Lookup::NotFound => Ok(PollStep::Pending("certificate not found yet".to_string())),
            Lookup::Found(cert) => {
                let summary = cert
                    .ready_condition()
                    .map(|c| {
                        format!(
                            "Ready={} reason={}",
                            c.status,
                            c.reason.as_deref().unwrap_or("<none>")
                        )
                    })
                    .unwrap_or_else(|| "no Ready condition yet".to_string());
                if cert.is_ready() {
                    Ok(PollStep::Done(summary))
                } else {
                    Ok(PollStep::Pending(summary))
                }
            }
        }
    })
    .await?;

    if !outcome.is_success() {
        warn!(
            namespace,
            certificate = name,
            last = outcome.last().map(String::as_str).unwrap_or("never observed"),
            "timed out waiting for certificate readiness"
        );
    }
    Ok(outcome.is_success())
}
