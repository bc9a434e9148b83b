use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use haven_core::{PaymentProviderKind, ReservationStatus};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use super::certs::CertificateSource;
use super::{EventMeaning, WebhookError, WebhookEvent, WebhookScheme};
use crate::payment::ReservationTag;

pub const SIGNATURE_HEADER: &str = "paypal-transmission-sig";
pub const TRANSMISSION_ID_HEADER: &str = "paypal-transmission-id";
pub const TRANSMISSION_TIME_HEADER: &str = "paypal-transmission-time";
pub const CERT_URL_HEADER: &str = "paypal-cert-url";
pub const AUTH_ALGO_HEADER: &str = "paypal-auth-algo";

const SUPPORTED_AUTH_ALGO: &str = "SHA256withRSA";

#[derive(Debug, Deserialize)]
struct PaypalEnvelope {
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct PaypalEvent {
    resource: PaypalResource,
}

#[derive(Debug, Deserialize)]
struct PaypalResource {
    custom_id: Option<String>,
}

/// `PayPal-Transmission-Sig` scheme: RSA over the transmission metadata and body.
pub struct PaypalWebhookScheme {
    webhook_id: String,
    trusted_cert_prefix: String,
    certificates: Arc<dyn CertificateSource>,
}

impl PaypalWebhookScheme {
    pub fn new(
        webhook_id: impl Into<String>,
        trusted_cert_prefix: impl Into<String>,
        certificates: Arc<dyn CertificateSource>,
    ) -> Self {
        Self {
            webhook_id: webhook_id.into(),
            trusted_cert_prefix: trusted_cert_prefix.into(),
            certificates,
        }
    }
}

/// `<transmission id>|<transmission time>|<webhook id>|<raw payload>`
pub fn signed_message(transmission_id: &str, transmission_time: &str, webhook_id: &str, payload: &[u8]) -> Vec<u8> {
    let mut message = format!("{}|{}|{}|", transmission_id, transmission_time, webhook_id).into_bytes();
    message.extend_from_slice(payload);
    message
}

fn required<'a>(event: &'a WebhookEvent, name: &str) -> Result<&'a str, WebhookError> {
    event
        .header(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| WebhookError::VerificationFailed(format!("missing {} header", name)))
}

#[async_trait]
impl WebhookScheme for PaypalWebhookScheme {
    fn provider(&self) -> PaymentProviderKind {
        PaymentProviderKind::Paypal
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn verify(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        if self.webhook_id.trim().is_empty() || self.trusted_cert_prefix.trim().is_empty() {
            return Err(WebhookError::VerificationFailed("paypal webhook is not configured".to_string()));
        }
        let transmission_id = required(event, TRANSMISSION_ID_HEADER)?;
        let transmission_time = required(event, TRANSMISSION_TIME_HEADER)?;
        let signature = required(event, SIGNATURE_HEADER)?;
        let cert_url = required(event, CERT_URL_HEADER)?;

        if let Some(algo) = event.header(AUTH_ALGO_HEADER) {
            if !algo.eq_ignore_ascii_case(SUPPORTED_AUTH_ALGO) {
                return Err(WebhookError::VerificationFailed(format!("unsupported auth algorithm {}", algo)));
            }
        }
        if !cert_url.starts_with(&self.trusted_cert_prefix) {
            return Err(WebhookError::VerificationFailed(format!("untrusted certificate url {}", cert_url)));
        }

        let signature_bytes = STANDARD
            .decode(signature.trim())
            .map_err(|_| WebhookError::VerificationFailed("signature is not base64".to_string()))?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| WebhookError::VerificationFailed("invalid signature encoding".to_string()))?;

        let key = self.certificates.public_key(cert_url).await?;
        let message = signed_message(transmission_id, transmission_time, &self.webhook_id, event.payload());
        VerifyingKey::<Sha256>::new(key)
            .verify(&message, &signature)
            .map_err(|_| WebhookError::VerificationFailed("signature mismatch".to_string()))
    }

    fn event_type(&self, payload: &[u8]) -> Result<String, WebhookError> {
        serde_json::from_slice::<PaypalEnvelope>(payload)
            .map(|envelope| envelope.event_type)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    fn map_event(&self, event_type: &str) -> EventMeaning {
        match event_type {
            "PAYMENT.CAPTURE.COMPLETED" => EventMeaning::Resolves(ReservationStatus::Successful),
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => EventMeaning::Resolves(ReservationStatus::Failed),
            "CHECKOUT.ORDER.APPROVED" => EventMeaning::Informational,
            _ => EventMeaning::Unhandled,
        }
    }

    fn extract_reservation(&self, payload: &[u8]) -> Result<Uuid, WebhookError> {
        let event: PaypalEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let custom_id = event
            .resource
            .custom_id
            .ok_or_else(|| WebhookError::MalformedPayload("resource.custom_id missing".to_string()))?;
        let tag: ReservationTag = serde_json::from_str(&custom_id)
            .map_err(|e| WebhookError::MalformedPayload(format!("invalid custom_id: {}", e)))?;
        Ok(tag.reservation_id)
    }
}
