use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

use super::WebhookError;

/// Resolves a signing certificate URL to the RSA key inside it.
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn public_key(&self, cert_url: &str) -> Result<RsaPublicKey, WebhookError>;
}

/// RSA public key of a PEM-encoded X.509 certificate.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, WebhookError> {
    let certificate = Certificate::from_pem(pem.as_bytes())
        .map_err(|e| WebhookError::VerificationFailed(format!("invalid certificate: {}", e)))?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| WebhookError::VerificationFailed(format!("invalid certificate key: {}", e)))?;
    RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| WebhookError::VerificationFailed(format!("certificate key is not RSA: {}", e)))
}

pub struct HttpCertificateSource {
    http_client: Client,
}

impl HttpCertificateSource {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl CertificateSource for HttpCertificateSource {
    async fn public_key(&self, cert_url: &str) -> Result<RsaPublicKey, WebhookError> {
        let response = self
            .http_client
            .get(cert_url)
            .send()
            .await
            .map_err(|e| WebhookError::VerificationFailed(format!("certificate fetch failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WebhookError::VerificationFailed(format!(
                "certificate fetch returned {}",
                response.status()
            )));
        }
        let pem = response
            .text()
            .await
            .map_err(|e| WebhookError::VerificationFailed(format!("certificate fetch failed: {}", e)))?;
        public_key_from_pem(&pem)
    }
}

/// Keeps keys per certificate URL for `ttl`.
pub struct CachedCertificateSource {
    inner: Arc<dyn CertificateSource>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, RsaPublicKey)>>,
}

impl CachedCertificateSource {
    pub fn new(inner: Arc<dyn CertificateSource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CertificateSource for CachedCertificateSource {
    async fn public_key(&self, cert_url: &str) -> Result<RsaPublicKey, WebhookError> {
        if let Some((fetched_at, key)) = self.entries.read().await.get(cert_url) {
            if fetched_at.elapsed() < self.ttl {
                return Ok(key.clone());
            }
        }

        let key = self.inner.public_key(cert_url).await?;
        debug!(cert_url, "signing certificate cached");
        self.entries
            .write()
            .await
            .insert(cert_url.to_string(), (Instant::now(), key.clone()));
        Ok(key)
    }
}
