pub mod clock;
pub mod payment;
pub mod repository;
pub mod reservation;
pub mod room;

pub use clock::{Clock, FixedClock, SystemClock};
pub use payment::{PaymentHandle, PaymentIntentRequest, PaymentProvider, PaymentProviderKind, ProviderError};
pub use repository::{ReservationStore, ReservationTx, RoomRepository, StatusWrite};
pub use reservation::{GuestContact, Reservation, ReservationRequest, ReservationStatus, StayWindow};
pub use room::{Room, RoomStatus};

use uuid::Uuid;

/// Errors surfaced by the reservation lifecycle to its callers.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("room {room_id} is already reserved for the requested window")]
    Conflict { room_id: Uuid },
    #[error("{0} not found")]
    NotFound(String),
    #[error("payment provider unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl ReservationError {
    /// Stable machine-readable code, used in API error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::InvalidInput(_) => "invalid_input",
            ReservationError::Conflict { .. } => "conflict",
            ReservationError::NotFound(_) => "not_found",
            ReservationError::UpstreamUnavailable(_) => "upstream_unavailable",
            ReservationError::StorageFailure(_) => "storage_failure",
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backend itself rejected an overlapping active reservation.
    #[error("overlapping active reservation")]
    Overlap,
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        ReservationError::StorageFailure(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type ReservationResult<T> = Result<T, ReservationError>;
