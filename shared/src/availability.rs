//! Date-range conflict detection for reservations.
//!
//! Stays are half-open intervals `[check_in, check_out)`: a guest checking
//! out on the same day another checks in does not collide with them.

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::{AppError, ReservationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, AppError> {
        if check_out <= check_in {
            return Err(AppError::Validation(
                "check-out date must be after check-in date".to_string(),
            ));
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && self.check_out > other.check_in
    }
}

/// An existing reservation as seen by the conflict check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedStay {
    pub property_id: Uuid,
    pub range: DateRange,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<DateRange>,
}

impl Availability {
    pub fn from_conflicts(conflicts: Vec<DateRange>) -> Self {
        Self {
            available: conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Ranges of `property_id`'s non-cancelled stays that overlap `candidate`,
/// ordered by check-in.
pub fn find_conflicts(
    stays: &[BookedStay],
    property_id: Uuid,
    candidate: &DateRange,
) -> Vec<DateRange> {
    let mut conflicts: Vec<DateRange> = stays
        .iter()
        .filter(|stay| stay.property_id == property_id)
        .filter(|stay| stay.status.blocks_dates())
        .filter(|stay| stay.range.overlaps(candidate))
        .map(|stay| stay.range)
        .collect();
    conflicts.sort_by_key(|range| range.check_in);
    conflicts
}

/// Keeps the properties that have no conflict with `candidate`, preserving
/// the input order.
pub fn available_properties(
    property_ids: &[Uuid],
    stays: &[BookedStay],
    candidate: &DateRange,
) -> Vec<Uuid> {
    property_ids
        .iter()
        .copied()
        .filter(|id| find_conflicts(stays, *id, candidate).is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(date(from), date(to)).unwrap()
    }

    fn stay(property_id: Uuid, from: &str, to: &str, status: ReservationStatus) -> BookedStay {
        BookedStay {
            property_id,
            range: range(from, to),
            status,
        }
    }

    #[test]
    fn rejects_empty_or_inverted_ranges() {
        assert!(DateRange::new(date("2025-01-05"), date("2025-01-05")).is_err());
        assert!(DateRange::new(date("2025-01-05"), date("2025-01-01")).is_err());
        assert_eq!(range("2025-01-01", "2025-01-05").nights(), 4);
    }

    #[test]
    fn disjoint_ranges_are_available() {
        let property = Uuid::new_v4();
        let stays = vec![
            stay(property, "2025-01-01", "2025-01-05", ReservationStatus::Confirmed),
            stay(property, "2025-01-20", "2025-01-25", ReservationStatus::Requested),
        ];
        assert!(find_conflicts(&stays, property, &range("2025-01-08", "2025-01-12")).is_empty());
        assert!(find_conflicts(&stays, property, &range("2024-12-20", "2024-12-28")).is_empty());
    }

    #[test]
    fn sharing_a_night_is_a_conflict() {
        let property = Uuid::new_v4();
        let stays = vec![stay(property, "2025-01-01", "2025-01-05", ReservationStatus::Requested)];

        for (from, to) in [
            ("2024-12-30", "2025-01-02"),
            ("2025-01-04", "2025-01-09"),
            ("2025-01-02", "2025-01-03"),
            ("2025-01-01", "2025-01-05"),
        ] {
            let conflicts = find_conflicts(&stays, property, &range(from, to));
            assert_eq!(conflicts, vec![range("2025-01-01", "2025-01-05")], "{from}..{to}");
        }
    }

    #[test]
    fn back_to_back_stays_are_allowed() {
        let property = Uuid::new_v4();
        let stays = vec![stay(property, "2025-01-01", "2025-01-05", ReservationStatus::Confirmed)];

        let after = find_conflicts(&stays, property, &range("2025-01-05", "2025-01-08"));
        let before = find_conflicts(&stays, property, &range("2024-12-28", "2025-01-01"));
        assert!(after.is_empty());
        assert!(before.is_empty());
    }

    #[test]
    fn containing_an_existing_stay_is_a_conflict() {
        let property = Uuid::new_v4();
        let stays = vec![stay(property, "2025-02-10", "2025-02-12", ReservationStatus::Confirmed)];

        let availability = Availability::from_conflicts(find_conflicts(
            &stays,
            property,
            &range("2025-02-01", "2025-02-20"),
        ));
        assert!(!availability.available);
        assert_eq!(availability.conflicts, vec![range("2025-02-10", "2025-02-12")]);
    }

    #[test]
    fn cancelled_stays_never_block() {
        let property = Uuid::new_v4();
        let stays = vec![stay(property, "2025-03-01", "2025-03-10", ReservationStatus::Cancelled)];

        let availability = Availability::from_conflicts(find_conflicts(
            &stays,
            property,
            &range("2025-03-05", "2025-03-08"),
        ));
        assert!(availability.available);
        assert!(availability.conflicts.is_empty());
    }

    #[test]
    fn conflicts_are_scoped_to_the_property() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let stays = vec![stay(a, "2025-04-01", "2025-04-05", ReservationStatus::Confirmed)];
        let candidate = range("2025-04-01", "2025-04-05");

        assert_eq!(find_conflicts(&stays, a, &candidate).len(), 1);
        assert!(find_conflicts(&stays, b, &candidate).is_empty());
        assert_eq!(available_properties(&[a, b], &stays, &candidate), vec![b]);
    }

    #[test]
    fn conflicts_are_reported_in_check_in_order() {
        let property = Uuid::new_v4();
        let stays = vec![
            stay(property, "2025-05-10", "2025-05-12", ReservationStatus::Requested),
            stay(property, "2025-05-02", "2025-05-04", ReservationStatus::Confirmed),
            stay(property, "2025-05-06", "2025-05-08", ReservationStatus::Cancelled),
        ];

        let conflicts = find_conflicts(&stays, property, &range("2025-05-01", "2025-05-31"));
        assert_eq!(
            conflicts,
            vec![range("2025-05-02", "2025-05-04"), range("2025-05-10", "2025-05-12")]
        );
    }

    #[test]
    fn listing_keeps_only_conflict_free_properties_in_order() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let stays = vec![
            stay(ids[1], "2025-06-01", "2025-06-03", ReservationStatus::Confirmed),
            stay(ids[2], "2025-06-02", "2025-06-04", ReservationStatus::Cancelled),
            stay(ids[3], "2025-06-03", "2025-06-09", ReservationStatus::Requested),
        ];

        let available = available_properties(&ids, &stays, &range("2025-06-01", "2025-06-03"));
        assert_eq!(available, vec![ids[0], ids[2], ids[3]]);
    }
}
