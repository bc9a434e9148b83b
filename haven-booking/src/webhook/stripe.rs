use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{Clock, PaymentProviderKind, ReservationStatus};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{EventMeaning, WebhookError, WebhookEvent, WebhookScheme};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct StripeEventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeObject,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// `Stripe-Signature` HMAC scheme.
pub struct StripeWebhookScheme {
    webhook_secret: String,
    tolerance_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl StripeWebhookScheme {
    pub fn new(webhook_secret: impl Into<String>, tolerance_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            tolerance_seconds,
            clock,
        }
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, the value carried in `v1=`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::VerificationFailed(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::VerificationFailed("invalid signature timestamp".to_string()))?,
                );
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::VerificationFailed("signature header has no timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::VerificationFailed("signature header has no v1 signature".to_string()));
    }
    Ok((timestamp, signatures))
}

#[async_trait]
impl WebhookScheme for StripeWebhookScheme {
    fn provider(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn verify(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        // `hmac` accepts an empty key.
        if self.webhook_secret.trim().is_empty() {
            return Err(WebhookError::VerificationFailed("stripe webhook secret is not configured".to_string()));
        }
        let header = event
            .header(SIGNATURE_HEADER)
            .ok_or_else(|| WebhookError::VerificationFailed("missing Stripe-Signature header".to_string()))?;
        let (timestamp, signatures) = parse_signature_header(header)?;

        let expected = compute_signature(&self.webhook_secret, timestamp, event.payload())?;
        let matched = signatures
            .iter()
            .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));
        if !matched {
            return Err(WebhookError::VerificationFailed("signature mismatch".to_string()));
        }

        let skew = (self.clock.now().timestamp() - timestamp).abs();
        if skew > self.tolerance_seconds {
            return Err(WebhookError::VerificationFailed(format!(
                "signature timestamp outside tolerance ({}s)",
                skew
            )));
        }
        Ok(())
    }

    fn event_type(&self, payload: &[u8]) -> Result<String, WebhookError> {
        serde_json::from_slice::<StripeEventEnvelope>(payload)
            .map(|envelope| envelope.event_type)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    fn map_event(&self, event_type: &str) -> EventMeaning {
        match event_type {
            "payment_intent.succeeded" => EventMeaning::Resolves(ReservationStatus::Successful),
            "payment_intent.payment_failed" | "payment_intent.canceled" => {
                EventMeaning::Resolves(ReservationStatus::Failed)
            }
            "payment_method.attached" => EventMeaning::Informational,
            _ => EventMeaning::Unhandled,
        }
    }

    fn extract_reservation(&self, payload: &[u8]) -> Result<Uuid, WebhookError> {
        let event: StripeEvent =
            serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let raw = event
            .data
            .object
            .metadata
            .get("reservation_id")
            .ok_or_else(|| WebhookError::MalformedPayload("metadata.reservation_id missing".to_string()))?;
        Uuid::parse_str(raw).map_err(|_| WebhookError::MalformedPayload(format!("invalid reservation id: {}", raw)))
    }
}
