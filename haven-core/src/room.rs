use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Informational room status. Booking conflicts are decided by the reservation table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Free,
    Held,
    Reserved,
    Occupied,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Free => "FREE",
            RoomStatus::Held => "HELD",
            RoomStatus::Reserved => "RESERVED",
            RoomStatus::Occupied => "OCCUPIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(RoomStatus::Free),
            "HELD" => Some(RoomStatus::Held),
            "RESERVED" => Some(RoomStatus::Reserved),
            "OCCUPIED" => Some(RoomStatus::Occupied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub room_number: i32,
    /// Nightly price in minor currency units.
    pub price_minor: i64,
    pub status: RoomStatus,
}
