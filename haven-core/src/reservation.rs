use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use haven_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payment::PaymentProviderKind;
use crate::{ReservationError, ReservationResult};

/// Reservation status. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Successful,
    Failed,
    Cancelled,
}

impl ReservationStatus {
    /// Statuses that occupy a room for overlap purposes.
    pub const ACTIVE: [ReservationStatus; 2] = [ReservationStatus::Pending, ReservationStatus::Successful];

    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Successful => "SUCCESSFUL",
            ReservationStatus::Failed => "FAILED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "SUCCESSFUL" => Ok(ReservationStatus::Successful),
            "FAILED" => Ok(ReservationStatus::Failed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

/// Half-open stay interval `[from, to)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StayWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl StayWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> ReservationResult<Self> {
        if to <= from {
            return Err(ReservationError::InvalidInput(
                "to_time must be after from_time".to_string(),
            ));
        }
        Ok(Self { from, to })
    }

    /// Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &StayWindow) -> bool {
        self.from < other.to && other.from < self.to
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuestContact {
    pub name: String,
    pub phone: Masked<String>,
    pub email: Masked<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub guest: GuestContact,
    pub booked_by: Option<String>,
    pub window: StayWindow,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// A fresh PENDING reservation.
    pub fn pending(
        room_id: Uuid,
        guest: GuestContact,
        booked_by: Option<String>,
        window: StayWindow,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            guest,
            booked_by,
            window,
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Inbound "reserve room" request, as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    pub room_id: Uuid,
    pub guest_name: String,
    pub guest_phone: Masked<String>,
    pub guest_email: Masked<String>,
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
    pub provider: String,
    /// Filled from the authenticated caller, never from the body.
    #[serde(skip)]
    pub booked_by: Option<String>,
}

impl ReservationRequest {
    pub fn provider_kind(&self) -> ReservationResult<PaymentProviderKind> {
        self.provider
            .parse()
            .map_err(|_| ReservationError::InvalidInput(format!("unsupported payment provider: {}", self.provider)))
    }

    /// Structural validation. Collects every problem into one message.
    pub fn validate(&self, now: DateTime<Utc>) -> ReservationResult<(GuestContact, StayWindow)> {
        let mut problems = Vec::new();

        if self.room_id.is_nil() {
            problems.push("room id is required");
        }
        if self.guest_name.trim().is_empty() {
            problems.push("guest name is required");
        }
        if self.guest_phone.is_blank() {
            problems.push("guest phone is required");
        }
        if self.guest_email.is_blank() {
            problems.push("guest email is required");
        } else if !self.guest_email.expose().contains('@') {
            problems.push("guest email is invalid");
        }
        if self.from_time < now {
            problems.push("from time can not be in the past");
        }
        if self.to_time <= self.from_time {
            problems.push("to time must be after from time");
        }

        if !problems.is_empty() {
            return Err(ReservationError::InvalidInput(problems.join("; ")));
        }

        let guest = GuestContact {
            name: self.guest_name.trim().to_string(),
            phone: Masked::new(self.guest_phone.expose().trim().to_string()),
            email: Masked::new(self.guest_email.expose().trim().to_string()),
        };
        Ok((guest, StayWindow::new(self.from_time, self.to_time)?))
    }
}
