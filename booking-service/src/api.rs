use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::extract::{ValidJson, ValidQuery};
use shared::handlers::*;
use shared::views::{InquiryView, PropertyDetail, PropertySummary, ReservationView};
use shared::{ApiResponse, AppError, Availability, DateRange, DbPool};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyAccessRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct StayQuery {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    #[validate(range(min = 1, max = 50))]
    pub guests: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CodeQuery {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailQuery {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub property_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub guest_name: String,
    #[validate(email)]
    pub guest_email: String,
    #[validate(length(min = 5, max = 30))]
    pub guest_phone: Option<String>,
    #[validate(range(min = 1, max = 50))]
    pub guest_count: i32,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    #[validate(length(max = 2000))]
    pub special_requests: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInquiryRequest {
    pub property_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 5, max = 30))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(flatten)]
    pub availability: Availability,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/access/verify", post(verify_access))
        .route("/properties", get(list_properties))
        .route("/properties/:slug", get(get_property))
        .route("/properties/:slug/availability", get(property_availability))
        .route("/reservations", post(create_reservation).get(find_reservation_by_code))
        .route("/reservations/:id", get(get_reservation))
        .route("/inquiries", post(create_inquiry))
        .route("/inquiries/:id", get(get_inquiry))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// A bookable stay starting today or later.
fn upcoming_stay(check_in: NaiveDate, check_out: NaiveDate, today: NaiveDate) -> Result<DateRange, AppError> {
    if check_in < today {
        return Err(AppError::Validation(
            "check-in date cannot be in the past".to_string(),
        ));
    }
    DateRange::new(check_in, check_out)
}

fn requested_stay(query: &StayQuery, today: NaiveDate) -> Result<Option<DateRange>, AppError> {
    match (query.check_in, query.check_out) {
        (Some(check_in), Some(check_out)) => upcoming_stay(check_in, check_out, today).map(Some),
        (None, None) => Ok(None),
        _ => Err(AppError::Validation(
            "check_in and check_out must be given together".to_string(),
        )),
    }
}

fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let ip_address = header("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header("x-real-ip"));

    ClientInfo {
        ip_address,
        user_agent: header(USER_AGENT.as_str()),
    }
}

pub async fn verify_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidJson(request): ValidJson<VerifyAccessRequest>,
) -> ApiResult<AccessGrant> {
    let manager = AccessManager::new(state.pool);
    let grant = manager.verify(&request.code, client_info(&headers)).await?;
    Ok(ApiResponse::ok(grant))
}

pub async fn list_properties(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<StayQuery>,
) -> ApiResult<Vec<PropertySummary>> {
    let guests = query.guests.unwrap_or(1);

    let properties = match requested_stay(&query, Utc::now().date_naive())? {
        Some(range) => {
            ReservationManager::new(state.pool)
                .available_properties(range, guests)
                .await?
        }
        None => {
            let mut properties = PropertyManager::new(state.pool).list_visible().await?;
            properties.retain(|property| property.max_guests >= guests);
            properties
        }
    };

    Ok(ApiResponse::ok(properties))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<PropertyDetail> {
    let property = PropertyManager::new(state.pool).get_by_slug(&slug).await?;
    Ok(ApiResponse::ok(property))
}

pub async fn property_availability(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ValidQuery(query): ValidQuery<StayQuery>,
) -> ApiResult<AvailabilityResponse> {
    let range = requested_stay(&query, Utc::now().date_naive())?.ok_or_else(|| {
        AppError::Validation("check_in and check_out are required".to_string())
    })?;

    let property = PropertyManager::new(state.pool.clone())
        .resolve_visible_slug(&slug)
        .await?;
    let availability = ReservationManager::new(state.pool)
        .check_availability(property.id, range)
        .await?;

    Ok(ApiResponse::ok(AvailabilityResponse {
        property_id: property.id,
        check_in: range.check_in,
        check_out: range.check_out,
        availability,
    }))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReservationView>>), AppError> {
    let range = upcoming_stay(
        request.check_in_date,
        request.check_out_date,
        Utc::now().date_naive(),
    )?;

    let input = NewReservationInput {
        property_id: request.property_id,
        guest_name: request.guest_name.trim().to_string(),
        guest_email: request.guest_email.trim().to_string(),
        guest_phone: request.guest_phone,
        guest_count: request.guest_count,
        range,
        special_requests: request.special_requests,
    };

    let reservation = ReservationManager::new(state.pool).create(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(reservation)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReservationView> {
    let reservation = ReservationManager::new(state.pool).get(id).await?;
    Ok(ApiResponse::ok(reservation))
}

pub async fn find_reservation_by_code(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<CodeQuery>,
) -> ApiResult<ReservationView> {
    let reservation = ReservationManager::new(state.pool)
        .get_by_code(&query.code)
        .await?;
    Ok(ApiResponse::ok(reservation))
}

pub async fn create_inquiry(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CreateInquiryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InquiryView>>), AppError> {
    let input = NewInquiryInput {
        property_id: request.property_id,
        name: request.name.trim().to_string(),
        email: request.email.trim().to_string(),
        phone: request.phone,
        subject: request.subject,
        message: request.message,
    };

    let inquiry = InquiryManager::new(state.pool).create(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(inquiry)))
}

pub async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidQuery(query): ValidQuery<EmailQuery>,
) -> ApiResult<InquiryView> {
    let inquiry = InquiryManager::new(state.pool)
        .get_for_guest(id, &query.email)
        .await?;
    Ok(ApiResponse::ok(inquiry))
}

pub async fn health_check() -> &'static str {
    "OK"
}
