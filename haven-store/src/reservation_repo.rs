use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::{
    GuestContact, Reservation, ReservationStatus, ReservationStore, ReservationTx, Room, RoomRepository,
    RoomStatus, StatusWrite, StayWindow, StoreError, StoreResult,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// SQLSTATE raised by the `reservations_no_active_overlap` exclusion constraint.
const EXCLUSION_VIOLATION: &str = "23P01";

const RESERVATION_COLUMNS: &str = "id, room_id, guest_name, guest_phone, guest_email, booked_by, \
     from_time, to_time, status, created_at, updated_at";

pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    room_id: Uuid,
    guest_name: String,
    guest_phone: String,
    guest_email: String,
    booked_by: Option<String>,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<ReservationStatus>().map_err(StoreError::Backend)?;
        Ok(Reservation {
            id: row.id,
            room_id: row.room_id,
            guest: GuestContact {
                name: row.guest_name,
                phone: row.guest_phone.into(),
                email: row.guest_email.into(),
            },
            booked_by: row.booked_by,
            window: StayWindow { from: row.from_time, to: row.to_time },
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: Uuid,
    hotel_id: Uuid,
    room_number: i32,
    price_minor: i64,
    status: String,
}

fn store_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(EXCLUSION_VIOLATION) {
            return StoreError::Overlap;
        }
    }
    StoreError::Backend(err.to_string())
}

fn into_reservations(rows: Vec<ReservationRow>) -> StoreResult<Vec<Reservation>> {
    rows.into_iter().map(Reservation::try_from).collect()
}

pub struct PgReservationTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ReservationTx for PgReservationTx {
    async fn lock_room(&mut self, room_id: Uuid) -> StoreResult<bool> {
        // Serialises concurrent check-then-insert on the same room until commit.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_err)?;
        Ok(locked.is_some())
    }

    async fn count_overlaps(&mut self, room_id: Uuid, window: &StayWindow) -> StoreResult<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM reservations
            WHERE room_id = $1
              AND status IN ('PENDING', 'SUCCESSFUL')
              AND from_time < $3
              AND $2 < to_time
            "#,
        )
        .bind(room_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(store_err)
    }

    async fn insert(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, room_id, guest_name, guest_phone, guest_email, booked_by, from_time, to_time, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.room_id)
        .bind(reservation.guest.name.as_str())
        .bind(reservation.guest.phone.expose().as_str())
        .bind(reservation.guest.email.expose().as_str())
        .bind(reservation.booked_by.as_deref())
        .bind(reservation.window.from)
        .bind(reservation.window.to)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(store_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(store_err)
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn begin(&self) -> StoreResult<Box<dyn ReservationTx>> {
        let tx = self.pool.begin().await.map_err(store_err)?;
        Ok(Box::new(PgReservationTx { tx }))
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> =
            sqlx::query_as(&format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn set_status(&self, id: Uuid, status: ReservationStatus) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn set_status_if(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        status: ReservationStatus,
    ) -> StoreResult<StatusWrite> {
        // Single statement: the row lock taken by UPDATE makes read-then-write atomic.
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = $1, updated_at = NOW() \
             WHERE id = $2 AND status = $3 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => Ok(StatusWrite::Written(row.try_into()?)),
            None => Ok(match self.get(id).await? {
                Some(current) => StatusWrite::Unchanged(current),
                None => StatusWrite::Missing,
            }),
        }
    }

    async fn list_for_room(&self, room_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE room_id = $1 ORDER BY from_time"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        into_reservations(rows)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE status = 'PENDING' AND created_at < $1 ORDER BY created_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        into_reservations(rows)
    }
}

#[async_trait]
impl RoomRepository for PgReservationStore {
    async fn get_room(&self, id: Uuid) -> StoreResult<Option<Room>> {
        let row: Option<RoomRow> =
            sqlx::query_as("SELECT id, hotel_id, room_number, price_minor, status FROM rooms WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;

        Ok(row.map(|row| Room {
            id: row.id,
            hotel_id: row.hotel_id,
            room_number: row.room_number,
            price_minor: row.price_minor,
            status: RoomStatus::parse(&row.status).unwrap_or(RoomStatus::Free),
        }))
    }
}
