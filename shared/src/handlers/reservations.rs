use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::{self, find_conflicts, Availability, BookedStay, DateRange};
use crate::confirmation::{generate_code, normalize_code};
use crate::handlers::properties::summarize;
use crate::models::*;
use crate::schema::*;
use crate::views::{quote_total, Page, PropertySummary, ReservationView};
use crate::{AppError, DbPool, ReservationStatus};

const CONFIRMATION_CODE_KEY: &str = "reservations_confirmation_code_key";
const NO_OVERLAP_CONSTRAINT: &str = "reservations_no_overlap";
const MAX_CODE_ATTEMPTS: usize = 5;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE: i64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct NewReservationInput {
    pub property_id: Uuid,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_count: i32,
    pub range: DateRange,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub property_id: Option<Uuid>,
    /// Keeps reservations whose stay overlaps this window.
    pub stay: Option<DateRange>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for ReservationFilter {
    fn default() -> Self {
        Self {
            status: None,
            property_id: None,
            stay: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ReservationFilter {
    pub fn with_page(mut self, page: Option<i64>, page_size: Option<i64>) -> Self {
        self.page = page.unwrap_or(1).clamp(1, MAX_PAGE);
        self.page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

pub struct ReservationManager {
    pool: DbPool,
}

impl ReservationManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn check_availability(&self, property_id: Uuid, range: DateRange) -> Result<Availability, AppError> {
        let mut conn = self.pool.get().await?;

        let exists = properties::table
            .find(property_id)
            .select(properties::id)
            .first::<Uuid>(&mut conn)
            .await
            .optional()?;

        if exists.is_none() {
            return Err(AppError::NotFound("property"));
        }

        let stays = load_blocking_stays(&mut conn, &[property_id], &range).await?;
        Ok(Availability::from_conflicts(find_conflicts(&stays, property_id, &range)))
    }

    pub async fn available_properties(&self, range: DateRange, guests: i32) -> Result<Vec<PropertySummary>, AppError> {
        let mut conn = self.pool.get().await?;

        let candidates = properties::table
            .filter(properties::is_visible.eq(true))
            .filter(properties::max_guests.ge(guests))
            .order(properties::created_at.desc())
            .select(Property::as_select())
            .load(&mut conn)
            .await?;

        let ids: Vec<Uuid> = candidates.iter().map(|property| property.id).collect();
        let stays = load_blocking_stays(&mut conn, &ids, &range).await?;
        let open = availability::available_properties(&ids, &stays, &range);

        let rows = candidates
            .into_iter()
            .filter(|property| open.contains(&property.id))
            .collect();

        summarize(&mut conn, rows).await
    }

    /// Books a stay. The property row is locked for the duration of the
    /// conflict check and insert, and the no-overlap exclusion constraint
    /// rejects anything that still slips through.
    pub async fn create(&self, input: NewReservationInput) -> Result<ReservationView, AppError> {
        let mut conn = self.pool.get().await?;

        let mut overlap_retried = false;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            match try_create(&mut conn, input.clone(), generate_code()).await {
                Err(err) if err.violates(CONFIRMATION_CODE_KEY) => {
                    warn!("Confirmation code collision on attempt {}, retrying", attempt);
                    continue;
                }
                Err(err) if err.violates(NO_OVERLAP_CONSTRAINT) => {
                    warn!(
                        "Exclusion constraint rejected booking for property {}",
                        input.property_id
                    );
                    let stays = load_blocking_stays(&mut conn, &[input.property_id], &input.range).await?;
                    let conflicts = find_conflicts(&stays, input.property_id, &input.range);

                    // The blocking stay was cancelled in the meantime.
                    if conflicts.is_empty() && !overlap_retried {
                        overlap_retried = true;
                        continue;
                    }
                    return Err(AppError::Conflict(conflicts));
                }
                Ok(view) => {
                    info!(
                        "Reservation {} ({}) created for property {}",
                        view.id, view.confirmation_code, view.property_id
                    );
                    return Ok(view);
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Internal(anyhow::anyhow!(
            "could not allocate a unique confirmation code"
        )))
    }

    pub async fn get(&self, id: Uuid) -> Result<ReservationView, AppError> {
        let mut conn = self.pool.get().await?;

        let (reservation, property) = reservations::table
            .inner_join(properties::table)
            .filter(reservations::id.eq(id))
            .select((Reservation::as_select(), Property::as_select()))
            .first::<(Reservation, Property)>(&mut conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("reservation"))?;

        ReservationView::new(reservation, &property)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<ReservationView, AppError> {
        let code = normalize_code(code);
        let mut conn = self.pool.get().await?;

        let (reservation, property) = reservations::table
            .inner_join(properties::table)
            .filter(reservations::confirmation_code.eq(&code))
            .select((Reservation::as_select(), Property::as_select()))
            .first::<(Reservation, Property)>(&mut conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("reservation"))?;

        ReservationView::new(reservation, &property)
    }

    pub async fn list(&self, filter: ReservationFilter) -> Result<Page<ReservationView>, AppError> {
        let mut conn = self.pool.get().await?;

        let total: i64 = filtered(&filter)
            .count()
            .get_result(&mut conn)
            .await?;

        let rows = filtered(&filter)
            .order((reservations::created_at.desc(), reservations::id.asc()))
            .limit(filter.page_size)
            .offset(filter.offset())
            .select(Reservation::as_select())
            .load(&mut conn)
            .await?;

        let property_ids: Vec<Uuid> = rows.iter().map(|r| r.property_id).collect();
        let properties: HashMap<Uuid, Property> = properties::table
            .filter(properties::id.eq_any(property_ids))
            .select(Property::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(|property| (property.id, property))
            .collect();

        let items = rows
            .into_iter()
            .map(|reservation| {
                let property = properties
                    .get(&reservation.property_id)
                    .ok_or(AppError::NotFound("property"))?;
                ReservationView::new(reservation, property)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total,
        })
    }

    pub async fn update_status(&self, id: Uuid, next: ReservationStatus) -> Result<ReservationView, AppError> {
        let mut conn = self.pool.get().await?;

        let (view, changed) = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let reservation = reservations::table
                        .find(id)
                        .select(Reservation::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or(AppError::NotFound("reservation"))?;

                    let property = properties::table
                        .find(reservation.property_id)
                        .select(Property::as_select())
                        .first(conn)
                        .await?;

                    let current: ReservationStatus = reservation.status.parse()?;
                    if current == next {
                        return Ok((ReservationView::new(reservation, &property)?, false));
                    }

                    if !current.can_transition_to(next) {
                        return Err(AppError::Validation(format!(
                            "cannot change a {} reservation to {}",
                            current, next
                        )));
                    }

                    let updated = diesel::update(reservations::table.find(id))
                        .set((
                            reservations::status.eq(next.as_str()),
                            reservations::updated_at.eq(Utc::now()),
                        ))
                        .returning(Reservation::as_returning())
                        .get_result(conn)
                        .await?;

                    Ok((ReservationView::new(updated, &property)?, true))
                })
            })
            .await?;

        if changed {
            info!("Reservation {} is now {}", id, next);
        }
        Ok(view)
    }
}

async fn try_create(
    conn: &mut AsyncPgConnection,
    input: NewReservationInput,
    confirmation_code: String,
) -> Result<ReservationView, AppError> {
    conn.transaction::<_, AppError, _>(|conn| {
        Box::pin(async move {
            let property = properties::table
                .find(input.property_id)
                .select(Property::as_select())
                .for_update()
                .first(conn)
                .await
                .optional()?
                .filter(|property| property.is_visible)
                .ok_or(AppError::NotFound("property"))?;

            if input.guest_count > property.max_guests {
                return Err(AppError::Validation(format!(
                    "this property accepts at most {} guests",
                    property.max_guests
                )));
            }

            let stays = load_blocking_stays(conn, &[property.id], &input.range).await?;
            let conflicts = find_conflicts(&stays, property.id, &input.range);
            if !conflicts.is_empty() {
                return Err(AppError::Conflict(conflicts));
            }

            let new_reservation = NewReservation {
                id: Uuid::new_v4(),
                property_id: property.id,
                confirmation_code,
                guest_name: input.guest_name,
                guest_email: input.guest_email,
                guest_phone: input.guest_phone,
                guest_count: input.guest_count,
                check_in_date: input.range.check_in,
                check_out_date: input.range.check_out,
                total_price: quote_total(&property.price_per_night, &input.range),
                status: ReservationStatus::Requested.as_str().to_string(),
                special_requests: input.special_requests,
            };

            let reservation = diesel::insert_into(reservations::table)
                .values(&new_reservation)
                .returning(Reservation::as_returning())
                .get_result(conn)
                .await?;

            ReservationView::new(reservation, &property)
        })
    })
    .await
}

fn filtered(filter: &ReservationFilter) -> reservations::BoxedQuery<'static, Pg> {
    let mut query = reservations::table.into_boxed();

    if let Some(status) = filter.status {
        query = query.filter(reservations::status.eq(status.as_str()));
    }
    if let Some(property_id) = filter.property_id {
        query = query.filter(reservations::property_id.eq(property_id));
    }
    if let Some(stay) = filter.stay {
        query = query
            .filter(reservations::check_in_date.lt(stay.check_out))
            .filter(reservations::check_out_date.gt(stay.check_in));
    }

    query
}

/// Non-cancelled reservations of the given properties that touch `range`.
async fn load_blocking_stays(
    conn: &mut AsyncPgConnection,
    property_ids: &[Uuid],
    range: &DateRange,
) -> Result<Vec<BookedStay>, AppError> {
    if property_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = reservations::table
        .filter(reservations::property_id.eq_any(property_ids.to_vec()))
        .filter(reservations::status.ne(ReservationStatus::Cancelled.as_str()))
        .filter(reservations::check_in_date.lt(range.check_out))
        .filter(reservations::check_out_date.gt(range.check_in))
        .select((
            reservations::property_id,
            reservations::check_in_date,
            reservations::check_out_date,
            reservations::status,
        ))
        .load::<(Uuid, NaiveDate, NaiveDate, String)>(conn)
        .await?;

    rows.into_iter()
        .map(|(property_id, check_in, check_out, status)| {
            Ok(BookedStay {
                property_id,
                range: DateRange::new(check_in, check_out)?,
                status: status.parse()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::violates;
    use crate::testing::{booking, seed_property, stay, TestDb};
    use axum::http::StatusCode;

    #[test]
    fn paging_is_clamped() {
        let filter = ReservationFilter::default().with_page(Some(0), Some(1000));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, MAX_PAGE_SIZE);
        assert_eq!(filter.offset(), 0);

        let filter = ReservationFilter::default().with_page(Some(3), None);
        assert_eq!(filter.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(filter.offset(), 40);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow_the_offset() {
        let filter = ReservationFilter::default().with_page(Some(i64::MAX), Some(MAX_PAGE_SIZE));
        assert_eq!(filter.page, MAX_PAGE);
        assert_eq!(filter.offset(), (MAX_PAGE - 1) * MAX_PAGE_SIZE);
    }

    fn conflicts_of(err: AppError) -> Vec<DateRange> {
        match err {
            AppError::Conflict(conflicts) => conflicts,
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn overlapping_booking_is_rejected_with_its_conflicts() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        let first = manager
            .create(booking(property_id, stay("2031-01-01", "2031-01-05")))
            .await
            .unwrap();
        assert_eq!(first.status, ReservationStatus::Requested);
        assert_eq!(first.nights, 4);
        assert_eq!(first.total_price, "480.00".parse::<bigdecimal::BigDecimal>().unwrap());

        let err = manager
            .create(booking(property_id, stay("2031-01-03", "2031-01-07")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(conflicts_of(err), vec![stay("2031-01-01", "2031-01-05")]);
    }

    #[tokio::test]
    async fn adjacent_other_property_and_cancelled_stays_do_not_block() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let neighbour_id = seed_property(&db.pool, "garden-house", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        let held = manager
            .create(booking(property_id, stay("2031-01-01", "2031-01-05")))
            .await
            .unwrap();

        manager
            .create(booking(property_id, stay("2031-01-05", "2031-01-08")))
            .await
            .unwrap();
        manager
            .create(booking(property_id, stay("2030-12-28", "2031-01-01")))
            .await
            .unwrap();
        manager
            .create(booking(neighbour_id, stay("2031-01-01", "2031-01-05")))
            .await
            .unwrap();

        manager
            .update_status(held.id, ReservationStatus::Cancelled)
            .await
            .unwrap();
        let rebooked = manager
            .create(booking(property_id, stay("2031-01-02", "2031-01-04")))
            .await
            .unwrap();
        assert_eq!(rebooked.check_in_date, "2031-01-02".parse::<NaiveDate>().unwrap());
    }

    #[tokio::test]
    async fn availability_only_counts_live_overlapping_stays() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        manager
            .create(booking(property_id, stay("2031-03-10", "2031-03-15")))
            .await
            .unwrap();
        let cancelled = manager
            .create(booking(property_id, stay("2031-03-20", "2031-03-25")))
            .await
            .unwrap();
        manager
            .update_status(cancelled.id, ReservationStatus::Cancelled)
            .await
            .unwrap();

        let open = manager
            .check_availability(property_id, stay("2031-03-15", "2031-03-20"))
            .await
            .unwrap();
        assert!(open.available);

        let busy = manager
            .check_availability(property_id, stay("2031-03-14", "2031-03-16"))
            .await
            .unwrap();
        assert!(!busy.available);
        assert_eq!(busy.conflicts, vec![stay("2031-03-10", "2031-03-15")]);

        let month = manager
            .check_availability(property_id, stay("2031-03-01", "2031-03-31"))
            .await
            .unwrap();
        assert_eq!(month.conflicts, vec![stay("2031-03-10", "2031-03-15")]);

        let err = manager
            .check_availability(Uuid::new_v4(), stay("2031-03-01", "2031-03-02"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let free = manager
            .available_properties(stay("2031-03-12", "2031-03-13"), 2)
            .await
            .unwrap();
        assert!(free.is_empty());
        let free = manager
            .available_properties(stay("2031-03-21", "2031-03-23"), 2)
            .await
            .unwrap();
        assert_eq!(free.len(), 1);
        assert!(manager
            .available_properties(stay("2031-03-21", "2031-03-23"), 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_bookings_admit_exactly_one() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = ReservationManager::new(db.pool.clone());
                tokio::spawn(async move {
                    manager
                        .create(booking(property_id, stay("2031-05-01", "2031-05-04")))
                        .await
                })
            })
            .collect();

        let mut booked = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => booked += 1,
                Err(err) => assert_eq!(conflicts_of(err), vec![stay("2031-05-01", "2031-05-04")]),
            }
        }
        assert_eq!(booked, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rejected_booking_always_names_its_conflicts_during_a_cancellation() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        let held = manager
            .create(booking(property_id, stay("2031-06-01", "2031-06-05")))
            .await
            .unwrap();

        let canceller = ReservationManager::new(db.pool.clone());
        let cancel = tokio::spawn(async move {
            canceller
                .update_status(held.id, ReservationStatus::Cancelled)
                .await
        });
        let attempt = manager
            .create(booking(property_id, stay("2031-06-02", "2031-06-06")))
            .await;
        cancel.await.unwrap().unwrap();

        match attempt {
            Ok(view) => assert_eq!(view.status, ReservationStatus::Requested),
            Err(err) => {
                assert!(!conflicts_of(err).is_empty());
                manager
                    .create(booking(property_id, stay("2031-06-02", "2031-06-06")))
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn exclusion_constraint_backs_up_the_conflict_check() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());
        manager
            .create(booking(property_id, stay("2031-07-01", "2031-07-05")))
            .await
            .unwrap();

        let mut conn = db.pool.get().await.unwrap();
        let sneaky = NewReservation {
            id: Uuid::new_v4(),
            property_id,
            confirmation_code: generate_code(),
            guest_name: "Direct Insert".to_string(),
            guest_email: "direct@example.com".to_string(),
            guest_phone: None,
            guest_count: 1,
            check_in_date: "2031-07-04".parse().unwrap(),
            check_out_date: "2031-07-06".parse().unwrap(),
            total_price: "240.00".parse().unwrap(),
            status: ReservationStatus::Confirmed.as_str().to_string(),
            special_requests: None,
        };
        let err = diesel::insert_into(reservations::table)
            .values(&sneaky)
            .execute(&mut conn)
            .await
            .unwrap_err();
        assert!(violates(&err, NO_OVERLAP_CONSTRAINT));

        let cancelled = NewReservation {
            id: Uuid::new_v4(),
            confirmation_code: generate_code(),
            status: ReservationStatus::Cancelled.as_str().to_string(),
            ..sneaky
        };
        diesel::insert_into(reservations::table)
            .values(&cancelled)
            .execute(&mut conn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lookup_by_code_ignores_case() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        let created = manager
            .create(booking(property_id, stay("2031-08-01", "2031-08-03")))
            .await
            .unwrap();
        assert!(created.confirmation_code.starts_with("RS-"));

        let found = manager
            .get_by_code(&format!(" {} ", created.confirmation_code.to_lowercase()))
            .await
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.property_slug, "harbour-loft");

        let err = manager.get_by_code("RS-NOTFOUND").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn guest_limit_and_visibility_are_enforced() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 2).await;
        let manager = ReservationManager::new(db.pool.clone());

        let mut crowd = booking(property_id, stay("2031-09-01", "2031-09-03"));
        crowd.guest_count = 3;
        let err = manager.create(crowd).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = manager
            .create(booking(Uuid::new_v4(), stay("2031-09-01", "2031-09-03")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_only_moves_forward() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());
        let created = manager
            .create(booking(property_id, stay("2031-10-01", "2031-10-03")))
            .await
            .unwrap();

        let confirmed = manager
            .update_status(created.id, ReservationStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);

        let again = manager
            .update_status(created.id, ReservationStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(again.updated_at, confirmed.updated_at);

        let err = manager
            .update_status(created.id, ReservationStatus::Requested)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn listing_filters_and_pages() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = ReservationManager::new(db.pool.clone());

        for (check_in, check_out) in [
            ("2031-11-01", "2031-11-03"),
            ("2031-11-03", "2031-11-05"),
            ("2031-11-10", "2031-11-12"),
        ] {
            manager
                .create(booking(property_id, stay(check_in, check_out)))
                .await
                .unwrap();
        }

        let page = manager
            .list(ReservationFilter::default().with_page(Some(1), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);

        let early = manager
            .list(ReservationFilter {
                stay: Some(stay("2031-11-02", "2031-11-04")),
                ..ReservationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(early.total, 2);

        let confirmed = manager
            .list(ReservationFilter {
                status: Some(ReservationStatus::Confirmed),
                ..ReservationFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(confirmed.total, 0);
    }
}
