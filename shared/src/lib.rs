pub mod availability;
pub mod confirmation;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod schema;
#[cfg(test)]
pub(crate) mod testing;
pub mod views;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use availability::{Availability, BookedStay, DateRange};
pub use db::DbPool;
pub use error::{ApiResponse, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[serde(alias = "pending")]
    Requested,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Requested => "requested",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a reservation in this status holds its dates.
    pub fn blocks_dates(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    /// Status only moves forward: requested -> confirmed -> cancelled,
    /// or requested -> cancelled directly.
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Requested, ReservationStatus::Confirmed)
                | (ReservationStatus::Requested, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" | "pending" => Ok(ReservationStatus::Requested),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(AppError::Validation(format!(
                "unknown reservation status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    Open,
    Answered,
    Closed,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquiryStatus::Open => "open",
            InquiryStatus::Answered => "answered",
            InquiryStatus::Closed => "closed",
        }
    }
}

impl FromStr for InquiryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InquiryStatus::Open),
            "answered" => Ok(InquiryStatus::Answered),
            "closed" => Ok(InquiryStatus::Closed),
            other => Err(AppError::Validation(format!(
                "unknown inquiry status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Guest,
    Admin,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSender::Guest => "guest",
            MessageSender::Admin => "admin",
        }
    }
}

impl FromStr for MessageSender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(MessageSender::Guest),
            "admin" => Ok(MessageSender::Admin),
            other => Err(AppError::Validation(format!(
                "unknown message sender: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_an_alias_for_requested() {
        assert_eq!(
            "pending".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::Requested
        );
        let parsed: ReservationStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, ReservationStatus::Requested);
        assert_eq!(
            serde_json::to_string(&ReservationStatus::Requested).unwrap(),
            "\"requested\""
        );
    }

    #[test]
    fn status_moves_forward_only() {
        use ReservationStatus::*;
        assert!(Requested.can_transition_to(Confirmed));
        assert!(Requested.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Requested));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(Requested));
        assert!(!Requested.can_transition_to(Requested));
    }

    #[test]
    fn only_cancelled_releases_dates() {
        assert!(ReservationStatus::Requested.blocks_dates());
        assert!(ReservationStatus::Confirmed.blocks_dates());
        assert!(!ReservationStatus::Cancelled.blocks_dates());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "archived".parse::<ReservationStatus>().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!("resolved".parse::<InquiryStatus>().is_err());
        assert_eq!("admin".parse::<MessageSender>().unwrap(), MessageSender::Admin);
    }
}
