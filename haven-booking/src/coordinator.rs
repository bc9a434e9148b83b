use std::time::Duration;

use haven_core::{
    PaymentHandle, PaymentProviderKind, Reservation, ReservationError, ReservationRequest, ReservationResult,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::ledger::ReservationLedger;
use crate::payment::PaymentInitiator;
use crate::webhook::{WebhookDisposition, WebhookEvent, WebhookResolver};

/// A created reservation and what the guest needs to pay for it.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationReceipt {
    pub reservation: Reservation,
    pub payment: PaymentHandle,
}

/// Entry point for the reservation lifecycle: reserve, pay, settle.
pub struct ReservationCoordinator {
    ledger: ReservationLedger,
    initiator: PaymentInitiator,
    resolver: WebhookResolver,
}

impl ReservationCoordinator {
    pub fn new(ledger: ReservationLedger, initiator: PaymentInitiator, resolver: WebhookResolver) -> Self {
        Self {
            ledger,
            initiator,
            resolver,
        }
    }

    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    /// Create a PENDING reservation and initiate its payment.
    ///
    /// If the provider call fails the reservation is kept; the cancellation
    /// timer releases the room once the grace period runs out.
    pub async fn reserve_room(&self, request: ReservationRequest) -> ReservationResult<ReservationReceipt> {
        let provider = request.provider_kind()?;
        if !self.initiator.supports(provider) {
            return Err(ReservationError::InvalidInput(format!(
                "payment provider {} is not configured",
                provider
            )));
        }

        let reservation = self.ledger.reserve(&request).await?;
        match self.initiator.initiate(provider, &reservation).await {
            Ok(payment) => Ok(ReservationReceipt { reservation, payment }),
            Err(err) => {
                warn!(
                    reservation_id = %reservation.id,
                    %provider,
                    error = %err,
                    "payment initiation failed, reservation left pending"
                );
                Err(err)
            }
        }
    }

    pub async fn payment_webhook(&self, event: &WebhookEvent) -> WebhookDisposition {
        self.resolver.handle(event).await
    }

    pub async fn capture_payment(&self, provider: PaymentProviderKind, reference: &str) -> ReservationResult<()> {
        self.initiator.capture(provider, reference).await
    }

    pub async fn room_reservations(&self, room_id: Uuid) -> ReservationResult<Vec<Reservation>> {
        self.ledger.reservations_for_room(room_id).await
    }

    pub async fn stale_pending(&self, older_than: Duration) -> ReservationResult<Vec<Reservation>> {
        self.ledger.stale_pending(older_than).await
    }
}
