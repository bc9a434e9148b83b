pub mod certs;
pub mod paypal;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{PaymentProviderKind, ReservationError, ReservationStatus};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ledger::{ReservationLedger, Resolution};
use crate::metrics::BookingMetrics;

pub use certs::{CachedCertificateSource, CertificateSource, HttpCertificateSource};
pub use paypal::PaypalWebhookScheme;
pub use stripe::StripeWebhookScheme;

/// Raw provider notification: the exact body bytes plus headers keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct WebhookEvent {
    payload: Vec<u8>,
    headers: HashMap<String, String>,
}

impl WebhookEvent {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook verification failed: {0}")]
    VerificationFailed(String),
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),
    #[error("storage failure: {0}")]
    Storage(String),
}

/// What a verified event type means for the reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMeaning {
    Resolves(ReservationStatus),
    Informational,
    Unhandled,
}

/// Per-provider authentication and payload interpretation.
#[async_trait]
pub trait WebhookScheme: Send + Sync {
    fn provider(&self) -> PaymentProviderKind;

    /// Header whose presence routes an event to this scheme.
    fn signature_header(&self) -> &'static str;

    async fn verify(&self, event: &WebhookEvent) -> Result<(), WebhookError>;

    fn event_type(&self, payload: &[u8]) -> Result<String, WebhookError>;

    fn map_event(&self, event_type: &str) -> EventMeaning;

    fn extract_reservation(&self, payload: &[u8]) -> Result<Uuid, WebhookError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// No scheme recognised the headers.
    Ignored,
    /// Authentication failed; nothing was read or written.
    Rejected,
    Malformed,
    Informational { event_type: String },
    Unhandled { event_type: String },
    Applied { reservation_id: Uuid, status: ReservationStatus },
    /// The reservation had already left PENDING. Replays land here.
    AlreadyTerminal { reservation_id: Uuid, status: ReservationStatus },
    ReservationNotFound { reservation_id: Uuid },
    StorageFailed,
}

impl WebhookDisposition {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookDisposition::Ignored => "ignored",
            WebhookDisposition::Rejected => "rejected",
            WebhookDisposition::Malformed => "malformed",
            WebhookDisposition::Informational { .. } => "informational",
            WebhookDisposition::Unhandled { .. } => "unhandled",
            WebhookDisposition::Applied { .. } => "applied",
            WebhookDisposition::AlreadyTerminal { .. } => "already_terminal",
            WebhookDisposition::ReservationNotFound { .. } => "reservation_not_found",
            WebhookDisposition::StorageFailed => "storage_failed",
        }
    }
}

/// Authenticates provider notifications and settles the reservations they refer to.
pub struct WebhookResolver {
    schemes: Vec<Arc<dyn WebhookScheme>>,
    ledger: ReservationLedger,
    metrics: BookingMetrics,
}

impl WebhookResolver {
    pub fn new(ledger: ReservationLedger, metrics: BookingMetrics) -> Self {
        Self {
            schemes: Vec::new(),
            ledger,
            metrics,
        }
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn WebhookScheme>) -> Self {
        self.schemes.push(scheme);
        self
    }

    /// Never fails; every outcome is a disposition.
    pub async fn handle(&self, event: &WebhookEvent) -> WebhookDisposition {
        let Some(scheme) = self
            .schemes
            .iter()
            .find(|scheme| event.header(scheme.signature_header()).is_some())
        else {
            warn!("webhook without a recognised signature header ignored");
            self.metrics.webhook("unknown", WebhookDisposition::Ignored.label());
            return WebhookDisposition::Ignored;
        };

        let provider = scheme.provider();
        let disposition = match self.process(scheme.as_ref(), event).await {
            Ok(disposition) => disposition,
            Err(err) => contain(provider, err),
        };
        self.metrics.webhook(provider.as_str(), disposition.label());
        disposition
    }

    async fn process(
        &self,
        scheme: &dyn WebhookScheme,
        event: &WebhookEvent,
    ) -> Result<WebhookDisposition, WebhookError> {
        let provider = scheme.provider();
        scheme.verify(event).await?;

        let event_type = scheme.event_type(event.payload())?;
        let status = match scheme.map_event(&event_type) {
            EventMeaning::Resolves(status) => status,
            EventMeaning::Informational => {
                debug!(%provider, %event_type, "informational webhook");
                return Ok(WebhookDisposition::Informational { event_type });
            }
            EventMeaning::Unhandled => {
                info!(%provider, %event_type, "unhandled webhook event type");
                return Ok(WebhookDisposition::Unhandled { event_type });
            }
        };

        let reservation_id = scheme.extract_reservation(event.payload())?;
        match self.ledger.resolve_pending(reservation_id, status).await {
            Ok(Resolution::Applied(reservation)) => {
                if let Some(timer) = self.ledger.timer() {
                    timer.disarm(reservation.id);
                }
                info!(%provider, %reservation_id, %status, "reservation settled by payment webhook");
                Ok(WebhookDisposition::Applied { reservation_id, status })
            }
            Ok(Resolution::AlreadyTerminal(reservation)) => {
                if status == ReservationStatus::Successful && reservation.status == ReservationStatus::Cancelled {
                    warn!(
                        %provider,
                        %reservation_id,
                        "payment succeeded for a cancelled reservation, refund required"
                    );
                } else {
                    debug!(%provider, %reservation_id, current = %reservation.status, "webhook replay ignored");
                }
                Ok(WebhookDisposition::AlreadyTerminal {
                    reservation_id,
                    status: reservation.status,
                })
            }
            Err(ReservationError::NotFound(_)) => Err(WebhookError::ReservationNotFound(reservation_id)),
            Err(err) => Err(WebhookError::Storage(err.to_string())),
        }
    }
}

fn contain(provider: PaymentProviderKind, err: WebhookError) -> WebhookDisposition {
    match err {
        WebhookError::VerificationFailed(reason) => {
            warn!(%provider, %reason, "webhook rejected");
            WebhookDisposition::Rejected
        }
        WebhookError::MalformedPayload(reason) => {
            warn!(%provider, %reason, "malformed webhook payload");
            WebhookDisposition::Malformed
        }
        WebhookError::ReservationNotFound(reservation_id) => {
            warn!(%provider, %reservation_id, "webhook for unknown reservation");
            WebhookDisposition::ReservationNotFound { reservation_id }
        }
        WebhookError::Storage(reason) => {
            error!(%provider, %reason, "failed to apply webhook");
            WebhookDisposition::StorageFailed
        }
    }
}
