use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = properties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Property {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub address_en: Option<String>,
    pub max_guests: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub price_per_night: BigDecimal,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = properties)]
pub struct NewProperty {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub address: String,
    pub address_en: Option<String>,
    pub max_guests: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub price_per_night: BigDecimal,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = properties)]
pub struct PropertyChangeset {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    /// `Some(None)` clears the column.
    pub address_en: Option<Option<String>>,
    pub max_guests: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub price_per_night: Option<BigDecimal>,
    pub is_visible: Option<bool>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = property_images)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PropertyImage {
    pub id: Uuid,
    pub property_id: Uuid,
    pub url: String,
    pub storage_path: Option<String>,
    pub display_order: i32,
    pub is_thumbnail: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = property_images)]
pub struct NewPropertyImage {
    pub id: Uuid,
    pub property_id: Uuid,
    pub url: String,
    pub storage_path: Option<String>,
    pub display_order: i32,
    pub is_thumbnail: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = amenities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Amenity {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = amenities)]
pub struct NewAmenity {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = amenities)]
pub struct AmenityChangeset {
    pub name: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = property_amenities)]
pub struct PropertyAmenity {
    pub property_id: Uuid,
    pub amenity_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = reservations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Reservation {
    pub id: Uuid,
    pub property_id: Uuid,
    pub confirmation_code: String,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_count: i32,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
    pub status: String,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reservations)]
pub struct NewReservation {
    pub id: Uuid,
    pub property_id: Uuid,
    pub confirmation_code: String,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_count: i32,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
    pub status: String,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = inquiries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Inquiry {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = inquiries)]
pub struct NewInquiry {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = inquiry_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InquiryMessage {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = inquiry_messages)]
pub struct NewInquiryMessage {
    pub id: Uuid,
    pub inquiry_id: Uuid,
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = access_codes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccessCode {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub created_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn admits(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.expires_at.map_or(true, |expires_at| expires_at > now)
            && self.max_uses.map_or(true, |max_uses| self.use_count < max_uses)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = access_codes)]
pub struct NewAccessCode {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = access_codes)]
pub struct AccessCodeChangeset {
    pub label: Option<String>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub max_uses: Option<Option<i32>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = access_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccessLog {
    pub id: Uuid,
    pub access_code_id: Option<Uuid>,
    pub code_attempted: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = access_logs)]
pub struct NewAccessLog {
    pub id: Uuid,
    pub access_code_id: Option<Uuid>,
    pub code_attempted: String,
    pub success: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
