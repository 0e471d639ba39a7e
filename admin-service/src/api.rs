use std::borrow::Cow;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shared::extract::{nullable, ValidJson, ValidQuery};
use shared::handlers::{
    AccessLogFilter, AccessManager, AmenityManager, InquiryManager, NewAccessCodeInput, NewImageInput,
    NewPropertyInput, PropertyChanges, PropertyManager, ReservationFilter, ReservationManager,
};
use shared::models::{AccessCode, AccessCodeChangeset, AccessLog, Amenity, AmenityChangeset, PropertyChangeset, PropertyImage};
use shared::views::{InquiryView, Page, PropertyDetail, PropertySummary, ReservationView};
use shared::{ApiResponse, AppError, Availability, DateRange, DbPool, InquiryStatus, ReservationStatus};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::require_admin;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub admin_token: Arc<str>,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let well_formed = !slug.is_empty()
        && slug.len() <= 80
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("slug").with_message(Cow::from(
            "slug must be lowercase letters, digits and single hyphens",
        )))
    }
}

fn validate_price(price: &BigDecimal) -> Result<(), ValidationError> {
    if *price > BigDecimal::zero() {
        Ok(())
    } else {
        Err(ValidationError::new("price").with_message(Cow::from("price must be positive")))
    }
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePropertyRequest {
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub description: String,
    #[validate(length(min = 1, max = 300))]
    pub address: String,
    #[validate(length(max = 300))]
    pub address_en: Option<String>,
    #[validate(range(min = 1, max = 50))]
    pub max_guests: i32,
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: i32,
    #[validate(range(min = 0, max = 50))]
    pub bathrooms: i32,
    #[validate(custom(function = "validate_price"))]
    pub price_per_night: BigDecimal,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    #[serde(default)]
    pub amenity_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePropertyRequest {
    #[validate(custom(function = "validate_slug"))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 10000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 300))]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 300))]
    pub address_en: Option<Option<String>>,
    #[validate(range(min = 1, max = 50))]
    pub max_guests: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bathrooms: Option<i32>,
    #[validate(custom(function = "validate_price"))]
    pub price_per_night: Option<BigDecimal>,
    pub is_visible: Option<bool>,
    pub amenity_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddImageRequest {
    #[validate(url)]
    pub url: String,
    #[validate(length(max = 500))]
    pub storage_path: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, max = 1000))]
    pub display_order: i32,
    #[serde(default)]
    pub is_thumbnail: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AvailabilityQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(flatten)]
    pub availability: Availability,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReservationListQuery {
    pub status: Option<ReservationStatus>,
    pub property_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[validate(range(min = 1, max = 1000000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReservationStatusRequest {
    pub status: ReservationStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AmenityRequest {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
    #[validate(length(max = 60))]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAmenityRequest {
    #[validate(length(min = 1, max = 60))]
    pub name: Option<String>,
    #[validate(length(max = 60))]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InquiryListQuery {
    pub status: Option<InquiryStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplyRequest {
    #[validate(length(min = 1, max = 5000))]
    pub body: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InquiryStatusRequest {
    pub status: InquiryStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccessCodeRequest {
    #[validate(length(min = 4, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub label: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAccessCodeRequest {
    #[validate(length(min = 1, max = 100))]
    pub label: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(range(min = 1))]
    pub max_uses: Option<Option<i32>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AccessLogQuery {
    pub access_code_id: Option<Uuid>,
    pub success: Option<bool>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<i64>,
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/properties", get(list_properties).post(create_property))
        .route(
            "/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/properties/:id/images", post(add_image))
        .route("/properties/:id/images/:image_id", delete(remove_image))
        .route("/properties/:id/availability", get(property_availability))
        .route("/reservations", get(list_reservations))
        .route("/reservations/:id", get(get_reservation))
        .route("/reservations/:id/status", patch(update_reservation_status))
        .route("/amenities", get(list_amenities).post(create_amenity))
        .route("/amenities/:id", put(update_amenity).delete(delete_amenity))
        .route("/inquiries", get(list_inquiries))
        .route("/inquiries/:id", get(get_inquiry))
        .route("/inquiries/:id/replies", post(reply_to_inquiry))
        .route("/inquiries/:id/status", patch(set_inquiry_status))
        .route("/access-codes", get(list_access_codes).post(create_access_code))
        .route(
            "/access-codes/:id",
            patch(update_access_code).delete(delete_access_code),
        )
        .route("/access-logs", get(list_access_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(protected)
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

fn window(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Option<DateRange>, AppError> {
    match (from, to) {
        (Some(from), Some(to)) => DateRange::new(from, to).map(Some),
        (None, None) => Ok(None),
        _ => Err(AppError::Validation(
            "from and to must be given together".to_string(),
        )),
    }
}

fn ensure_future_expiry(expires_at: Option<DateTime<Utc>>) -> Result<(), AppError> {
    match expires_at {
        Some(expires_at) if expires_at <= Utc::now() => Err(AppError::Validation(
            "expires_at must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

// Properties

pub async fn list_properties(State(state): State<AppState>) -> ApiResult<Vec<PropertySummary>> {
    let properties = PropertyManager::new(state.pool).list_all().await?;
    Ok(ApiResponse::ok(properties))
}

pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PropertyDetail> {
    let property = PropertyManager::new(state.pool).get_detail(id).await?;
    Ok(ApiResponse::ok(property))
}

pub async fn create_property(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CreatePropertyRequest>,
) -> Created<PropertyDetail> {
    let input = NewPropertyInput {
        slug: request.slug,
        name: request.name.trim().to_string(),
        description: request.description,
        address: request.address.trim().to_string(),
        address_en: request.address_en,
        max_guests: request.max_guests,
        bedrooms: request.bedrooms,
        bathrooms: request.bathrooms,
        price_per_night: request.price_per_night,
        is_visible: request.is_visible,
        amenity_ids: request.amenity_ids,
    };

    let property = PropertyManager::new(state.pool).create(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(property)))
}

pub async fn update_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdatePropertyRequest>,
) -> ApiResult<PropertyDetail> {
    let changes = PropertyChanges {
        fields: PropertyChangeset {
            slug: request.slug,
            name: request.name.map(|name| name.trim().to_string()),
            description: request.description,
            address: request.address.map(|address| address.trim().to_string()),
            address_en: request.address_en,
            max_guests: request.max_guests,
            bedrooms: request.bedrooms,
            bathrooms: request.bathrooms,
            price_per_night: request.price_per_night,
            is_visible: request.is_visible,
        },
        amenity_ids: request.amenity_ids,
    };

    let property = PropertyManager::new(state.pool).update(id, changes).await?;
    Ok(ApiResponse::ok(property))
}

pub async fn delete_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    PropertyManager::new(state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<AddImageRequest>,
) -> Created<PropertyImage> {
    let input = NewImageInput {
        url: request.url,
        storage_path: request.storage_path,
        display_order: request.display_order,
        is_thumbnail: request.is_thumbnail,
    };

    let image = PropertyManager::new(state.pool).add_image(id, input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(image)))
}

pub async fn remove_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    PropertyManager::new(state.pool).remove_image(id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn property_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidQuery(query): ValidQuery<AvailabilityQuery>,
) -> ApiResult<AvailabilityResponse> {
    let range = DateRange::new(query.check_in, query.check_out)?;
    let availability = ReservationManager::new(state.pool)
        .check_availability(id, range)
        .await?;

    Ok(ApiResponse::ok(AvailabilityResponse {
        property_id: id,
        check_in: range.check_in,
        check_out: range.check_out,
        availability,
    }))
}

// Reservations

pub async fn list_reservations(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ReservationListQuery>,
) -> ApiResult<Page<ReservationView>> {
    let filter = ReservationFilter {
        status: query.status,
        property_id: query.property_id,
        stay: window(query.from, query.to)?,
        ..ReservationFilter::default()
    }
    .with_page(query.page, query.page_size);

    let page = ReservationManager::new(state.pool).list(filter).await?;
    Ok(ApiResponse::ok(page))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReservationView> {
    let reservation = ReservationManager::new(state.pool).get(id).await?;
    Ok(ApiResponse::ok(reservation))
}

pub async fn update_reservation_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<ReservationStatusRequest>,
) -> ApiResult<ReservationView> {
    let reservation = ReservationManager::new(state.pool)
        .update_status(id, request.status)
        .await?;
    Ok(ApiResponse::ok(reservation))
}

// Amenities

pub async fn list_amenities(State(state): State<AppState>) -> ApiResult<Vec<Amenity>> {
    let amenities = AmenityManager::new(state.pool).list().await?;
    Ok(ApiResponse::ok(amenities))
}

pub async fn create_amenity(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<AmenityRequest>,
) -> Created<Amenity> {
    let amenity = AmenityManager::new(state.pool)
        .create(request.name, request.icon)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(amenity)))
}

pub async fn update_amenity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateAmenityRequest>,
) -> ApiResult<Amenity> {
    let changes = AmenityChangeset {
        name: request.name,
        icon: request.icon,
    };
    let amenity = AmenityManager::new(state.pool).update(id, changes).await?;
    Ok(ApiResponse::ok(amenity))
}

pub async fn delete_amenity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    AmenityManager::new(state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Inquiries

pub async fn list_inquiries(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<InquiryListQuery>,
) -> ApiResult<Vec<InquiryView>> {
    let inquiries = InquiryManager::new(state.pool).list(query.status).await?;
    Ok(ApiResponse::ok(inquiries))
}

pub async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InquiryView> {
    let inquiry = InquiryManager::new(state.pool).get(id).await?;
    Ok(ApiResponse::ok(inquiry))
}

pub async fn reply_to_inquiry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<ReplyRequest>,
) -> Created<InquiryView> {
    let inquiry = InquiryManager::new(state.pool).reply(id, request.body).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(inquiry)))
}

pub async fn set_inquiry_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<InquiryStatusRequest>,
) -> ApiResult<InquiryView> {
    let inquiry = InquiryManager::new(state.pool)
        .set_status(id, request.status)
        .await?;
    Ok(ApiResponse::ok(inquiry))
}

// Access codes

pub async fn list_access_codes(State(state): State<AppState>) -> ApiResult<Vec<AccessCode>> {
    let codes = AccessManager::new(state.pool).list().await?;
    Ok(ApiResponse::ok(codes))
}

pub async fn create_access_code(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CreateAccessCodeRequest>,
) -> Created<AccessCode> {
    ensure_future_expiry(request.expires_at)?;

    let input = NewAccessCodeInput {
        code: request.code,
        label: request.label.trim().to_string(),
        expires_at: request.expires_at,
        max_uses: request.max_uses,
    };

    let code = AccessManager::new(state.pool).create(input).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(code)))
}

pub async fn update_access_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(request): ValidJson<UpdateAccessCodeRequest>,
) -> ApiResult<AccessCode> {
    ensure_future_expiry(request.expires_at.flatten())?;

    let changes = AccessCodeChangeset {
        label: request.label.map(|label| label.trim().to_string()),
        is_active: request.is_active,
        expires_at: request.expires_at,
        max_uses: request.max_uses,
    };

    let code = AccessManager::new(state.pool).update(id, changes).await?;
    Ok(ApiResponse::ok(code))
}

pub async fn delete_access_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    AccessManager::new(state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_access_logs(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<AccessLogQuery>,
) -> ApiResult<Vec<AccessLog>> {
    let filter = AccessLogFilter {
        access_code_id: query.access_code_id,
        success: query.success,
        limit: query.limit,
    };

    let logs = AccessManager::new(state.pool).logs(filter).await?;
    Ok(ApiResponse::ok(logs))
}

pub async fn health_check() -> &'static str {
    "OK"
}
