//! Cached self-signed certificate for HTTPS.
//!
//! The certificate and its private key live together in one PEM file,
//! `server.pem`, under a per-user cache directory. It is reused for 30 days
//! and regenerated afterwards. Several server instances may race to
//! regenerate it: a file already removed by another instance is not an
//! error, and new files are renamed into place so no reader sees a partial
//! write. Whichever rename lands last wins.

use crate::error::{CertificateError, Result, ServerError};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, KeyPair,
    KeyUsagePurpose, RsaKeySize, SanType, SerialNumber,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// How long a cached certificate is reused.
pub const CERTIFICATE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// File name of the cached certificate inside the cache directory.
pub const CERTIFICATE_FILE: &str = "server.pem";

const DNS_NAMES: &[&str] = &[
    "localhost",
    "*.localhost",
    "localhost.localdomain",
    "*.local.dev",
];

/// Generates, caches and expires the self-signed certificate.
#[derive(Debug, Clone)]
pub struct CertificateManager {
    cache_dir: PathBuf,
}

impl CertificateManager {
    /// Use `cache_dir` for `server.pem`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Use the platform cache directory (`<cache>/devserve/ssl`).
    pub fn with_default_dir() -> std::result::Result<Self, CertificateError> {
        let cache_dir = dirs::cache_dir().ok_or(CertificateError::NoCacheDir)?;
        Ok(Self::new(cache_dir.join("devserve").join("ssl")))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the cached PEM file.
    pub fn cert_path(&self) -> PathBuf {
        self.cache_dir.join(CERTIFICATE_FILE)
    }

    /// Return the cached PEM, regenerating it when absent or older than
    /// [`CERTIFICATE_TTL`].
    pub async fn get_certificate(&self) -> std::result::Result<Vec<u8>, CertificateError> {
        let path = self.cert_path();

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                    .unwrap_or_default();

                if age < CERTIFICATE_TTL {
                    match tokio::fs::read(&path).await {
                        Ok(pem) => {
                            debug!(path = %path.display(), "using cached certificate");
                            return Ok(pem);
                        }
                        // Another instance removed it for regeneration
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => return Err(io_error(&path, source)),
                    }
                } else {
                    info!(path = %path.display(), "cached certificate expired, regenerating");
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => return Err(io_error(&path, source)),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(io_error(&path, source)),
        }

        // RSA key generation takes a while
        let pem = tokio::task::spawn_blocking(generate_pem)
            .await
            .map_err(generation_error)??;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| io_error(&self.cache_dir, source))?;
        self.replace_cached(&pem).await?;

        info!(path = %path.display(), "generated self-signed certificate");
        Ok(pem)
    }

    /// Write `pem` to a temporary file beside `server.pem` and rename it
    /// into place, so readers see either the old or the new file in full.
    async fn replace_cached(&self, pem: &[u8]) -> std::result::Result<(), CertificateError> {
        let path = self.cert_path();
        let temp = self.cache_dir.join(format!(
            ".{}.{:016x}.tmp",
            CERTIFICATE_FILE,
            rand::random::<u64>()
        ));

        tokio::fs::write(&temp, pem)
            .await
            .map_err(|source| io_error(&temp, source))?;
        if let Err(source) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error(&path, source));
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CertificateError {
    CertificateError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn generation_error(e: impl std::fmt::Display) -> CertificateError {
    CertificateError::Generation(e.to_string())
}

/// Generate a new RSA-2048 key and self-signed certificate (SHA-256) as one
/// PEM document, private key first.
pub fn generate_pem() -> std::result::Result<Vec<u8>, CertificateError> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "localhost");
    params.distinguished_name = dn;

    let mut sans = DNS_NAMES
        .iter()
        .map(|name| {
            Ia5String::try_from(*name)
                .map(SanType::DnsName)
                .map_err(generation_error)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    sans.push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    sans.push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    params.subject_alt_names = sans;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(30);

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.serial_number = Some(SerialNumber::from(rand::random::<u64>()));

    let key_pair = KeyPair::generate_rsa_for(&rcgen::PKCS_RSA_SHA256, RsaKeySize::_2048)
        .map_err(generation_error)?;
    let cert = params.self_signed(&key_pair).map_err(generation_error)?;

    let mut pem = key_pair.serialize_pem();
    pem.push_str(&cert.pem());
    Ok(pem.into_bytes())
}

/// Build the TLS server configuration from a cached PEM.
///
/// ALPN always offers `http/1.1`, and `h2` first when `http2` is enabled.
pub fn tls_config(pem: &[u8], http2: bool) -> Result<Arc<rustls::ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| CertificateError::InvalidPem(e.to_string()))?;
    if certs.is_empty() {
        return Err(CertificateError::InvalidPem("no certificate found".to_string()).into());
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| CertificateError::InvalidPem(e.to_string()))?
        .ok_or_else(|| CertificateError::InvalidPem("no private key found".to_string()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    config.alpn_protocols = if http2 {
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    } else {
        vec![b"http/1.1".to_vec()]
    };

    Ok(Arc::new(config))
}
