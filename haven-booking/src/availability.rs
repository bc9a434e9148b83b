use haven_core::{ReservationError, ReservationResult, ReservationTx, StayWindow};
use tracing::error;
use uuid::Uuid;

/// Number of active (PENDING or SUCCESSFUL) reservations on `room_id` intersecting `window`.
///
/// Runs inside the caller's transaction so the answer still holds at insert time.
/// A storage error is never read as "available".
pub async fn has_overlap(
    tx: &mut dyn ReservationTx,
    room_id: Uuid,
    window: &StayWindow,
) -> ReservationResult<i64> {
    tx.count_overlaps(room_id, window).await.map_err(|err| {
        error!(%room_id, error = %err, "availability check failed");
        ReservationError::StorageFailure(format!("unable to verify availability: {}", err))
    })
}
