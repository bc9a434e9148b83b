pub mod breaker;
pub mod paypal;
pub mod stripe;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use haven_core::{
    PaymentHandle, PaymentIntentRequest, PaymentProvider, PaymentProviderKind, ProviderError,
    Reservation, ReservationError, ReservationResult, RoomRepository,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::BookingMetrics;
use breaker::CircuitBreaker;

pub use paypal::PaypalProvider;
pub use stripe::StripeProvider;

const SECONDS_PER_NIGHT: i64 = 86_400;

/// Correlation ids attached to a charge and echoed back by provider webhooks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationTag {
    pub reservation_id: Uuid,
    pub room_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct InitiatorSettings {
    pub currency: String,
    pub timeout: Duration,
    pub breaker_threshold: usize,
    pub breaker_reset: Duration,
}

impl Default for InitiatorSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            timeout: Duration::from_secs(10),
            breaker_threshold: 5,
            breaker_reset: Duration::from_secs(30),
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn PaymentProvider>,
    breaker: CircuitBreaker,
}

/// Prices a reservation and asks the chosen provider for a payment handle.
pub struct PaymentInitiator {
    rooms: Arc<dyn RoomRepository>,
    providers: HashMap<PaymentProviderKind, ProviderSlot>,
    settings: InitiatorSettings,
    metrics: BookingMetrics,
}

impl PaymentInitiator {
    pub fn new(rooms: Arc<dyn RoomRepository>, settings: InitiatorSettings, metrics: BookingMetrics) -> Self {
        Self {
            rooms,
            providers: HashMap::new(),
            settings,
            metrics,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        let kind = provider.kind();
        let breaker = CircuitBreaker::new(
            kind.as_str(),
            self.settings.breaker_threshold,
            self.settings.breaker_reset,
        );
        self.providers.insert(kind, ProviderSlot { provider, breaker });
        self
    }

    pub fn supports(&self, kind: PaymentProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    fn slot(&self, kind: PaymentProviderKind) -> ReservationResult<&ProviderSlot> {
        self.providers
            .get(&kind)
            .ok_or_else(|| ReservationError::InvalidInput(format!("payment provider {} is not configured", kind)))
    }

    /// Amount due for the whole stay. Partial nights round up.
    pub async fn quote(&self, reservation: &Reservation) -> ReservationResult<i64> {
        let room = self
            .rooms
            .get_room(reservation.room_id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("room {}", reservation.room_id)))?;
        room.price_minor
            .checked_mul(nights(reservation))
            .ok_or_else(|| ReservationError::InvalidInput("stay is too long to price".to_string()))
    }

    /// Create a charge for a freshly created PENDING reservation.
    pub async fn initiate(
        &self,
        kind: PaymentProviderKind,
        reservation: &Reservation,
    ) -> ReservationResult<PaymentHandle> {
        let slot = self.slot(kind)?;
        let request = PaymentIntentRequest {
            reservation_id: reservation.id,
            room_id: reservation.room_id,
            amount_minor: self.quote(reservation).await?,
            currency: self.settings.currency.clone(),
        };

        let handle = self
            .call(kind, slot, slot.provider.create_intent(&request))
            .await?;
        info!(
            reservation_id = %reservation.id,
            provider = %kind,
            amount_minor = request.amount_minor,
            "payment initiated"
        );
        Ok(handle)
    }

    /// Capture an approved redirect-style payment.
    pub async fn capture(&self, kind: PaymentProviderKind, reference: &str) -> ReservationResult<()> {
        if reference.trim().is_empty() {
            return Err(ReservationError::InvalidInput("payment reference is required".to_string()));
        }
        let slot = self.slot(kind)?;
        self.call(kind, slot, slot.provider.capture(reference)).await?;
        info!(provider = %kind, reference, "payment captured");
        Ok(())
    }

    async fn call<T>(
        &self,
        kind: PaymentProviderKind,
        slot: &ProviderSlot,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> ReservationResult<T> {
        if !slot.breaker.allow().await {
            self.metrics.payment_call(kind.as_str(), "short_circuited");
            return Err(ReservationError::UpstreamUnavailable(format!(
                "{} is temporarily unavailable",
                kind
            )));
        }

        match tokio::time::timeout(self.settings.timeout, request).await {
            Ok(Ok(value)) => {
                slot.breaker.record_success().await;
                self.metrics.payment_call(kind.as_str(), "ok");
                Ok(value)
            }
            Ok(Err(ProviderError::Unsupported(kind))) => {
                slot.breaker.release().await;
                Err(ReservationError::InvalidInput(format!("{} does not support this operation", kind)))
            }
            Ok(Err(err)) => {
                warn!(provider = %kind, error = %err, "payment provider call failed");
                slot.breaker.record_failure().await;
                self.metrics.payment_call(kind.as_str(), "error");
                Err(ReservationError::UpstreamUnavailable(err.to_string()))
            }
            Err(_) => {
                warn!(provider = %kind, timeout = ?self.settings.timeout, "payment provider call timed out");
                slot.breaker.record_failure().await;
                self.metrics.payment_call(kind.as_str(), "timeout");
                Err(ReservationError::UpstreamUnavailable(format!("{} did not respond in time", kind)))
            }
        }
    }
}

fn nights(reservation: &Reservation) -> i64 {
    let seconds = (reservation.window.to - reservation.window.from).num_seconds();
    ((seconds + SECONDS_PER_NIGHT - 1) / SECONDS_PER_NIGHT).max(1)
}

/// Minor units rendered as a decimal string with two fraction digits.
pub(crate) fn decimal_amount(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}
