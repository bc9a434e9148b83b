use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator used to pick a payment provider strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    Paypal,
}

impl PaymentProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProviderKind::Stripe => "stripe",
            PaymentProviderKind::Paypal => "paypal",
        }
    }
}

impl fmt::Display for PaymentProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProviderKind::Stripe),
            "paypal" => Ok(PaymentProviderKind::Paypal),
            other => Err(format!("unknown payment provider: {}", other)),
        }
    }
}

/// What the client needs to finish paying.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PaymentHandle {
    /// Direct-charge providers: confirm client-side with this secret.
    ClientSecret(String),
    /// Redirect providers: send the guest to this URL.
    ApprovalUrl(String),
}

/// Ephemeral charge request; lives for one reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    pub reservation_id: Uuid,
    pub room_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),
    #[error("operation not supported by {0}")]
    Unsupported(PaymentProviderKind),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> PaymentProviderKind;

    /// Prepare a charge tagged with the reservation and room ids.
    async fn create_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentHandle, ProviderError>;

    /// Capture a payment the guest already approved. Redirect providers only.
    async fn capture(&self, reference: &str) -> Result<(), ProviderError> {
        let _ = reference;
        Err(ProviderError::Unsupported(self.kind()))
    }
}
