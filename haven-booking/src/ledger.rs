use std::sync::Arc;
use std::time::Duration;

use haven_core::{
    Clock, GuestContact, Reservation, ReservationError, ReservationRequest, ReservationResult,
    ReservationStatus, ReservationStore, ReservationTx, StatusWrite, StayWindow, StoreError,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability;
use crate::metrics::BookingMetrics;
use crate::timer::CancellationTimer;

/// Result of resolving a PENDING reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// PENDING moved to the requested terminal status.
    Applied(Reservation),
    /// The reservation had already left PENDING; it is returned as stored.
    AlreadyTerminal(Reservation),
}

/// Owns reservation state: the availability-checked insert and every status change.
#[derive(Clone)]
pub struct ReservationLedger {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    timer: Option<CancellationTimer>,
    metrics: BookingMetrics,
}

impl ReservationLedger {
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, metrics: BookingMetrics) -> Self {
        Self {
            store,
            clock,
            timer: None,
            metrics,
        }
    }

    /// Arm a cancellation timer for every reservation this ledger creates.
    pub fn with_cancellation(mut self, timer: CancellationTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn timer(&self) -> Option<&CancellationTimer> {
        self.timer.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // Handed to timer tasks so they never hold a reference back to the timer.
    fn detached(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            timer: None,
            metrics: self.metrics.clone(),
        }
    }

    /// Validate, then check availability and insert a PENDING row in one transaction.
    pub async fn reserve(&self, request: &ReservationRequest) -> ReservationResult<Reservation> {
        let (guest, window) = match request.validate(self.clock.now()) {
            Ok(parts) => parts,
            Err(err) => {
                self.metrics.reservation("invalid_input");
                return Err(err);
            }
        };

        let mut tx = self.store.begin().await.map_err(|err| {
            self.metrics.reservation("storage_failure");
            ReservationError::StorageFailure(format!("unable to open transaction: {}", err))
        })?;

        let staged = self
            .stage(tx.as_mut(), request.room_id, guest, request.booked_by.clone(), window)
            .await;

        let reservation = match staged {
            Ok(reservation) => reservation,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                self.metrics.reservation(err.code());
                return Err(err);
            }
        };

        if let Err(err) = tx.commit().await {
            let err = self.write_error(err, request.room_id);
            self.metrics.reservation(err.code());
            return Err(err);
        }

        info!(
            reservation_id = %reservation.id,
            room_id = %reservation.room_id,
            from = %reservation.window.from,
            to = %reservation.window.to,
            "reservation created"
        );
        self.metrics.reservation("created");

        if let Some(timer) = &self.timer {
            timer.schedule_cancellation(self.detached(), reservation.id, timer.grace());
        }
        Ok(reservation)
    }

    async fn stage(
        &self,
        tx: &mut dyn ReservationTx,
        room_id: Uuid,
        guest: GuestContact,
        booked_by: Option<String>,
        window: StayWindow,
    ) -> ReservationResult<Reservation> {
        let room_exists = tx
            .lock_room(room_id)
            .await
            .map_err(|err| ReservationError::StorageFailure(format!("unable to lock room: {}", err)))?;
        if !room_exists {
            return Err(ReservationError::NotFound(format!("room {}", room_id)));
        }

        if availability::has_overlap(&mut *tx, room_id, &window).await? > 0 {
            info!(%room_id, "requested window overlaps an active reservation");
            return Err(ReservationError::Conflict { room_id });
        }

        let reservation = Reservation::pending(room_id, guest, booked_by, window, self.clock.now());
        tx.insert(&reservation)
            .await
            .map_err(|err| self.write_error(err, room_id))?;
        Ok(reservation)
    }

    fn write_error(&self, err: StoreError, room_id: Uuid) -> ReservationError {
        match err {
            StoreError::Overlap => ReservationError::Conflict { room_id },
            other => ReservationError::StorageFailure(format!("unable to save reservation: {}", other)),
        }
    }

    /// Unconditional status write.
    pub async fn update_status(&self, id: Uuid, status: ReservationStatus) -> ReservationResult<Reservation> {
        let updated = self
            .store
            .set_status(id, status)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("reservation {}", id)))?;
        info!(reservation_id = %id, status = %status, "reservation status updated");
        Ok(updated)
    }

    /// Move a PENDING reservation to `status` atomically. Never overwrites a terminal status.
    pub async fn resolve_pending(&self, id: Uuid, status: ReservationStatus) -> ReservationResult<Resolution> {
        if !status.is_terminal() {
            return Err(ReservationError::InvalidInput(format!(
                "{} is not a terminal status",
                status
            )));
        }

        match self
            .store
            .set_status_if(id, ReservationStatus::Pending, status)
            .await?
        {
            StatusWrite::Written(reservation) => Ok(Resolution::Applied(reservation)),
            StatusWrite::Unchanged(reservation) => Ok(Resolution::AlreadyTerminal(reservation)),
            StatusWrite::Missing => Err(ReservationError::NotFound(format!("reservation {}", id))),
        }
    }

    pub async fn get(&self, id: Uuid) -> ReservationResult<Reservation> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ReservationError::NotFound(format!("reservation {}", id)))
    }

    pub async fn reservations_for_room(&self, room_id: Uuid) -> ReservationResult<Vec<Reservation>> {
        Ok(self.store.list_for_room(room_id).await?)
    }

    /// PENDING reservations created more than `older_than` ago.
    pub async fn stale_pending(&self, older_than: Duration) -> ReservationResult<Vec<Reservation>> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .ok_or_else(|| ReservationError::InvalidInput("threshold out of range".to_string()))?;
        let stale = self.store.list_pending_before(cutoff).await?;
        self.metrics.set_stale_pending(stale.len());
        Ok(stale)
    }

    /// Re-arm timers for reservations still PENDING, e.g. after a restart.
    /// Each one gets whatever is left of its grace period.
    pub async fn rearm_pending_timers(&self) -> ReservationResult<usize> {
        let Some(timer) = &self.timer else {
            return Ok(0);
        };

        let now = self.clock.now();
        let pending = self.store.list_pending_before(now + chrono::Duration::seconds(1)).await?;
        for reservation in &pending {
            let elapsed = (now - reservation.created_at).to_std().unwrap_or_default();
            let remaining = timer.grace().saturating_sub(elapsed);
            timer.schedule_cancellation(self.detached(), reservation.id, remaining);
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "re-armed cancellation timers");
        }
        Ok(pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use chrono::{DateTime, TimeZone, Utc};
    use haven_core::FixedClock;
    use haven_store::InMemoryStore;
    use prometheus::Registry;

    const GRACE: Duration = Duration::from_secs(900);

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 12, 0, 0).unwrap()
    }

    fn request(room_id: Uuid, from: u32, to: u32) -> ReservationRequest {
        ReservationRequest {
            room_id,
            guest_name: "Hana".into(),
            guest_phone: "+251911000000".to_string().into(),
            guest_email: "hana@example.com".to_string().into(),
            from_time: day(from),
            to_time: day(to),
            provider: "stripe".into(),
            booked_by: Some("customer-1".into()),
        }
    }

    struct Fixture {
        store: InMemoryStore,
        scheduler: Arc<ManualScheduler>,
        clock: Arc<FixedClock>,
        metrics: BookingMetrics,
        ledger: ReservationLedger,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let scheduler = Arc::new(ManualScheduler::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let metrics = BookingMetrics::new(&Registry::new()).unwrap();
        let timer = CancellationTimer::new(scheduler.clone(), GRACE, metrics.clone());
        let ledger = ReservationLedger::new(Arc::new(store.clone()), clock.clone(), metrics.clone())
            .with_cancellation(timer);
        Fixture {
            store,
            scheduler,
            clock,
            metrics,
            ledger,
        }
    }

    #[tokio::test]
    async fn reserve_creates_pending_and_arms_timer() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;

        let reservation = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();

        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.booked_by.as_deref(), Some("customer-1"));
        assert_eq!(f.ledger.get(reservation.id).await.unwrap(), reservation);
        assert_eq!(f.ledger.timer().unwrap().armed_count(), 1);
        assert_eq!(f.metrics.reservation_count("created"), 1);
    }

    #[tokio::test]
    async fn overlapping_window_is_a_conflict() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();

        let err = f.ledger.reserve(&request(room.id, 11, 13)).await.unwrap_err();
        assert!(matches!(err, ReservationError::Conflict { room_id } if room_id == room.id));
        assert_eq!(f.metrics.reservation_count("conflict"), 1);

        // Touching windows share no instant.
        f.ledger.reserve(&request(room.id, 12, 14)).await.unwrap();
        assert_eq!(f.ledger.reservations_for_room(room.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_and_failed_reservations_free_the_window() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        let first = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();
        f.ledger.update_status(first.id, ReservationStatus::Cancelled).await.unwrap();
        let second = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();
        f.ledger.update_status(second.id, ReservationStatus::Failed).await.unwrap();

        assert!(f.ledger.reserve(&request(room.id, 10, 12)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let f = fixture();
        let err = f.ledger.reserve(&request(Uuid::new_v4(), 10, 12)).await.unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_request_never_touches_the_store() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        f.store.set_unavailable(true);

        let mut bad = request(room.id, 10, 12);
        bad.guest_email = "not-an-email".to_string().into();
        let err = f.ledger.reserve(&bad).await.unwrap_err();
        assert!(matches!(err, ReservationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn storage_outage_is_a_storage_failure() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        f.store.set_unavailable(true);

        let err = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap_err();
        assert!(matches!(err, ReservationError::StorageFailure(_)));
        assert_eq!(f.metrics.reservation_count("storage_failure"), 1);
    }

    #[tokio::test]
    async fn timer_cancels_unpaid_reservation_after_grace() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        let reservation = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();

        f.scheduler.advance(GRACE - Duration::from_secs(1)).await;
        assert_eq!(f.ledger.get(reservation.id).await.unwrap().status, ReservationStatus::Pending);

        f.scheduler.advance(Duration::from_secs(1)).await;
        assert_eq!(f.ledger.get(reservation.id).await.unwrap().status, ReservationStatus::Cancelled);
        assert_eq!(f.metrics.timer_count("cancelled"), 1);
        assert_eq!(f.ledger.timer().unwrap().armed_count(), 0);
    }

    #[tokio::test]
    async fn timer_leaves_resolved_reservation_alone() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        let reservation = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();
        f.ledger
            .resolve_pending(reservation.id, ReservationStatus::Successful)
            .await
            .unwrap();

        f.scheduler.advance(GRACE).await;
        assert_eq!(f.ledger.get(reservation.id).await.unwrap().status, ReservationStatus::Successful);
        assert_eq!(f.metrics.timer_count("noop"), 1);
    }

    #[tokio::test]
    async fn resolve_pending_is_first_writer_wins() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        let reservation = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();

        let first = f
            .ledger
            .resolve_pending(reservation.id, ReservationStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(first, Resolution::Applied(ref r) if r.status == ReservationStatus::Cancelled));

        let second = f
            .ledger
            .resolve_pending(reservation.id, ReservationStatus::Successful)
            .await
            .unwrap();
        assert!(matches!(second, Resolution::AlreadyTerminal(ref r) if r.status == ReservationStatus::Cancelled));
    }

    #[tokio::test]
    async fn resolve_pending_rejects_pending_target() {
        let f = fixture();
        let err = f
            .ledger
            .resolve_pending(Uuid::new_v4(), ReservationStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_status_on_missing_reservation_is_not_found() {
        let f = fixture();
        let err = f
            .ledger
            .update_status(Uuid::new_v4(), ReservationStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::NotFound(_)));
    }

    #[tokio::test]
    async fn stale_pending_uses_the_clock() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        let old = f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(90));
        f.ledger.reserve(&request(room.id, 20, 22)).await.unwrap();

        let stale = f.ledger.stale_pending(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(stale.iter().map(|r| r.id).collect::<Vec<_>>(), vec![old.id]);
        assert_eq!(f.metrics.stale_pending(), 1);
    }

    #[tokio::test]
    async fn stale_threshold_beyond_calendar_is_invalid_input() {
        let f = fixture();
        let room = f.store.add_room(12_000).await;
        f.ledger.reserve(&request(room.id, 10, 12)).await.unwrap();

        for seconds in [10_000_000_000_000, u64::MAX] {
            let err = f.ledger.stale_pending(Duration::from_secs(seconds)).await.unwrap_err();
            assert!(matches!(err, ReservationError::InvalidInput(_)), "{}", seconds);
        }
    }

    #[tokio::test]
    async fn rearm_uses_remaining_grace() {
        let store = InMemoryStore::new();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        let metrics = BookingMetrics::new(&Registry::new()).unwrap();
        let room = store.add_room(12_000).await;

        // Created by a previous process with no timer.
        let previous = ReservationLedger::new(Arc::new(store.clone()), clock.clone(), metrics.clone());
        let reservation = previous.reserve(&request(room.id, 10, 12)).await.unwrap();
        clock.advance(chrono::Duration::seconds(600));

        let scheduler = Arc::new(ManualScheduler::new());
        let timer = CancellationTimer::new(scheduler.clone(), GRACE, metrics.clone());
        let restarted =
            ReservationLedger::new(Arc::new(store.clone()), clock.clone(), metrics).with_cancellation(timer);
        assert_eq!(restarted.rearm_pending_timers().await.unwrap(), 1);

        scheduler.advance(Duration::from_secs(299)).await;
        assert_eq!(restarted.get(reservation.id).await.unwrap().status, ReservationStatus::Pending);
        scheduler.advance(Duration::from_secs(1)).await;
        assert_eq!(restarted.get(reservation.id).await.unwrap().status, ReservationStatus::Cancelled);
    }
}
