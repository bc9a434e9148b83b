use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::reservation::{Reservation, ReservationStatus, StayWindow};
use crate::room::Room;
use crate::StoreResult;

/// Outcome of a guarded status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    /// The row held the expected status and now holds the new one.
    Written(Reservation),
    /// The row exists but held some other status; nothing was written.
    Unchanged(Reservation),
    Missing,
}

/// An open store transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait ReservationTx: Send {
    /// Lock the room row for the rest of the transaction. `false` if the room does not exist.
    async fn lock_room(&mut self, room_id: Uuid) -> StoreResult<bool>;

    /// Active reservations on `room_id` whose window intersects `window`.
    async fn count_overlaps(&mut self, room_id: Uuid, window: &StayWindow) -> StoreResult<i64>;

    async fn insert(&mut self, reservation: &Reservation) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Transactional reservation storage.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn ReservationTx>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Unconditional status write.
    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>>;

    /// Write `status` only if the row currently holds `expected`, atomically.
    async fn set_status_if(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
    ) -> StoreResult<StatusWrite>;

    async fn list_for_room(&self, room_id: Uuid) -> StoreResult<Vec<Reservation>>;

    /// PENDING reservations created before `cutoff`, oldest first.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Reservation>>;
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>>;
}
