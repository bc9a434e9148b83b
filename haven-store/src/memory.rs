use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::{
    Reservation, ReservationStatus, ReservationStore, ReservationTx, Room, RoomRepository, RoomStatus,
    StatusWrite, StayWindow, StoreError, StoreResult,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rooms: HashMap<Uuid, Room>,
    reservations: HashMap<Uuid, Reservation>,
}

/// Process-local store with the same contract as the Postgres one.
///
/// A transaction holds the table lock from `begin` until commit/rollback/drop,
/// so check-then-insert sequences are fully serialised.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_room(&self, room: Room) {
        self.tables.lock().await.rooms.insert(room.id, room);
    }

    /// Register a fresh room with the given nightly price.
    pub async fn add_room(&self, price_minor: i64) -> Room {
        let room = Room {
            id: Uuid::new_v4(),
            hotel_id: Uuid::new_v4(),
            room_number: 101,
            price_minor,
            status: RoomStatus::Free,
        };
        self.insert_room(room.clone()).await;
        room
    }

    /// Make every subsequent operation fail with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

pub struct InMemoryTx {
    tables: OwnedMutexGuard<Tables>,
    staged: Vec<Reservation>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryTx {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationTx for InMemoryTx {
    async fn lock_room(&mut self, room_id: Uuid) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.tables.rooms.contains_key(&room_id))
    }

    async fn count_overlaps(&mut self, room_id: Uuid, window: &StayWindow) -> StoreResult<i64> {
        self.check_available()?;
        let count = self
            .tables
            .reservations
            .values()
            .chain(self.staged.iter())
            .filter(|r| r.room_id == room_id && r.status.is_active() && r.window.overlaps(window))
            .count();
        Ok(count as i64)
    }

    async fn insert(&mut self, reservation: &Reservation) -> StoreResult<()> {
        self.check_available()?;
        self.staged.push(reservation.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.check_available()?;
        let staged = std::mem::take(&mut self.staged);
        for reservation in staged {
            self.tables.reservations.insert(reservation.id, reservation);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn ReservationTx>> {
        self.check_available()?;
        let tables = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryTx {
            tables,
            staged: Vec::new(),
            unavailable: self.unavailable.clone(),
        }))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        self.check_available()?;
        Ok(self.tables.lock().await.reservations.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        Ok(tables.reservations.get_mut(&id).map(|r| {
            r.status = status;
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn set_status_if(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
    ) -> StoreResult<StatusWrite> {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        Ok(match tables.reservations.get_mut(&id) {
            None => StatusWrite::Missing,
            Some(r) if r.status != expected => StatusWrite::Unchanged(r.clone()),
            Some(r) => {
                r.status = status;
                r.updated_at = Utc::now();
                StatusWrite::Written(r.clone())
            }
        })
    }

    async fn list_for_room(&self, room_id: Uuid) -> StoreResult<Vec<Reservation>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut found: Vec<Reservation> =
            tables.reservations.values().filter(|r| r.room_id == room_id).cloned().collect();
        found.sort_by_key(|r| r.window.from);
        Ok(found)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        let mut found: Vec<Reservation> = tables
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}

#[async_trait]
impl RoomRepository for InMemoryStore {
    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        self.check_available()?;
        Ok(self.tables.lock().await.rooms.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use haven_core::GuestContact;

    fn reservation(room_id: Uuid, from: u32, to: u32) -> Reservation {
        let window = StayWindow::new(
            Utc.with_ymd_and_hms(2025, 1, from, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, to, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let guest = GuestContact {
            name: "Guest".into(),
            phone: "+100".to_string().into(),
            email: "g@example.com".to_string().into(),
        };
        Reservation::pending(room_id, guest, None, window, Utc::now())
    }

    #[tokio::test]
    async fn dropped_transaction_discards_staged_rows() {
        let store = InMemoryStore::new();
        let room = store.add_room(10_000).await;
        let first = reservation(room.id, 10, 12);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&first).await.unwrap();
        }
        assert!(store.get(first.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert(&first).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.get(first.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn overlap_count_ignores_inactive_and_touching() {
        let store = InMemoryStore::new();
        let room = store.add_room(10_000).await;
        let active = reservation(room.id, 10, 12);
        let cancelled = reservation(room.id, 12, 14);

        let mut tx = store.begin().await.unwrap();
        tx.insert(&active).await.unwrap();
        tx.insert(&cancelled).await.unwrap();
        tx.commit().await.unwrap();
        store.set_status(cancelled.id, ReservationStatus::Cancelled).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let overlapping = reservation(room.id, 11, 13).window;
        assert_eq!(tx.count_overlaps(room.id, &overlapping).await.unwrap(), 1);
        let touching = reservation(room.id, 12, 13).window;
        assert_eq!(tx.count_overlaps(room.id, &touching).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guarded_write_only_moves_expected_status() {
        let store = InMemoryStore::new();
        let room = store.add_room(10_000).await;
        let r = reservation(room.id, 10, 12);
        let mut tx = store.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        tx.commit().await.unwrap();

        let first = store
            .set_status_if(r.id, ReservationStatus::Pending, ReservationStatus::Successful)
            .await
            .unwrap();
        assert!(matches!(first, StatusWrite::Written(ref w) if w.status == ReservationStatus::Successful));

        let second = store
            .set_status_if(r.id, ReservationStatus::Pending, ReservationStatus::Cancelled)
            .await
            .unwrap();
        assert!(matches!(second, StatusWrite::Unchanged(ref w) if w.status == ReservationStatus::Successful));

        let missing = store
            .set_status_if(Uuid::new_v4(), ReservationStatus::Pending, ReservationStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(missing, StatusWrite::Missing);
    }

    #[tokio::test]
    async fn unavailable_store_fails_reads() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get(Uuid::new_v4()).await, Err(StoreError::Backend(_))));
        assert!(store.begin().await.is_err());
    }
}
