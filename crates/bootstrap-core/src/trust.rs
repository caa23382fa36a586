//! OIDC issuer trust fact.
//!
//! The IAM OIDC provider pins the SHA-1 fingerprint of the issuer's TLS leaf
//! certificate. It is resolved from a live handshake on every run, never
//! hard-coded, so a rotated certificate is picked up by simply re-running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Default GitHub Actions OIDC issuer host.
pub const GITHUB_OIDC_HOST: &str = "token.actions.githubusercontent.com";

const DEFAULT_PORT: u16 = 443;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors while resolving the trust fact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrustError {
    #[error("could not connect: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("peer presented no certificate")]
    NoCertificate,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid thumbprint '{0}': expected 40 hex characters")]
    InvalidThumbprint(String),
}

// ---------------------------------------------------------------------------
// Thumbprint
// ---------------------------------------------------------------------------

/// Lower-case, colon-free SHA-1 certificate fingerprint (40 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Thumbprint(String);

impl Thumbprint {
    /// Fingerprint of a DER-encoded certificate.
    pub fn of_der(der: &[u8]) -> Self {
        Thumbprint(hex::encode(Sha1::digest(der)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Thumbprint {
    type Error = TrustError;

    /// Accepts `openssl`-style `AB:CD:...` as well as bare hex.
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if normalized.len() != 40 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TrustError::InvalidThumbprint(raw));
        }
        Ok(Thumbprint(normalized))
    }
}

impl From<Thumbprint> for String {
    fn from(value: Thumbprint) -> Self {
        value.0
    }
}

impl std::fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Source of the OIDC issuer fingerprint.
#[async_trait]
pub trait TrustFactResolver: Send + Sync {
    /// Host the fact is resolved for, used in error reports.
    fn host(&self) -> &str;

    async fn resolve(&self) -> Result<Thumbprint, TrustError>;
}

/// Resolves the fingerprint from a TLS handshake with the issuer.
///
/// The chain is verified against the webpki root store before the leaf is
/// hashed, so a man-in-the-middle certificate is refused rather than pinned.
#[derive(Debug, Clone)]
pub struct TlsThumbprintResolver {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for TlsThumbprintResolver {
    fn default() -> Self {
        Self::new(GITHUB_OIDC_HOST)
    }
}

impl TlsThumbprintResolver {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bound for connect and handshake, each.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connector() -> Result<TlsConnector, TrustError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| TrustError::Handshake(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }
}

#[async_trait]
impl TrustFactResolver for TlsThumbprintResolver {
    fn host(&self) -> &str {
        &self.host
    }

    async fn resolve(&self) -> Result<Thumbprint, TrustError> {
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| TrustError::Connect(format!("invalid host name: {e}")))?;
        let connector = Self::connector()?;

        let tcp = timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| TrustError::Timeout(self.timeout))?
        .map_err(|e| TrustError::Connect(e.to_string()))?;

        let tls = timeout(self.timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| TrustError::Timeout(self.timeout))?
            .map_err(|e| TrustError::Handshake(e.to_string()))?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(TrustError::NoCertificate)?;

        let thumbprint = Thumbprint::of_der(leaf.as_ref());
        debug!(host = %self.host, thumbprint = %thumbprint, "resolved issuer fingerprint");
        Ok(thumbprint)
    }
}

/// Fixed trust fact (testing only).
#[derive(Debug, Clone)]
pub struct StaticTrustFact {
    host: String,
    result: Result<Thumbprint, TrustError>,
}

impl StaticTrustFact {
    pub fn new(thumbprint: Thumbprint) -> Self {
        Self {
            host: GITHUB_OIDC_HOST.to_string(),
            result: Ok(thumbprint),
        }
    }

    pub fn unavailable(error: TrustError) -> Self {
        Self {
            host: GITHUB_OIDC_HOST.to_string(),
            result: Err(error),
        }
    }
}

#[async_trait]
impl TrustFactResolver for StaticTrustFact {
    fn host(&self) -> &str {
        &self.host
    }

    async fn resolve(&self) -> Result<Thumbprint, TrustError> {
        self.result.clone()
    }
}
