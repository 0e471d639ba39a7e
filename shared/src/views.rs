//! Response shapes assembled from one or more table rows.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::availability::DateRange;
use crate::models::*;
use crate::{AppError, InquiryStatus, MessageSender, ReservationStatus};

/// The image to show on listing cards: an explicitly flagged thumbnail wins,
/// otherwise the first image by display order, then upload time.
pub fn select_thumbnail(images: &[PropertyImage]) -> Option<&PropertyImage> {
    images
        .iter()
        .min_by_key(|image| (!image.is_thumbnail, image.display_order, image.created_at))
}

pub fn quote_total(price_per_night: &BigDecimal, range: &DateRange) -> BigDecimal {
    price_per_night * BigDecimal::from(range.nights())
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertySummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub address: String,
    pub address_en: Option<String>,
    pub max_guests: i32,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub price_per_night: BigDecimal,
    pub is_visible: bool,
    pub thumbnail_url: Option<String>,
    pub amenities: Vec<Amenity>,
}

impl PropertySummary {
    pub fn new(property: Property, images: &[PropertyImage], amenities: Vec<Amenity>) -> Self {
        let thumbnail_url = select_thumbnail(images).map(|image| image.url.clone());
        Self {
            id: property.id,
            slug: property.slug,
            name: property.name,
            address: property.address,
            address_en: property.address_en,
            max_guests: property.max_guests,
            bedrooms: property.bedrooms,
            bathrooms: property.bathrooms,
            price_per_night: property.price_per_night,
            is_visible: property.is_visible,
            thumbnail_url,
            amenities,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyDetail {
    #[serde(flatten)]
    pub property: Property,
    pub thumbnail_url: Option<String>,
    pub images: Vec<PropertyImage>,
    pub amenities: Vec<Amenity>,
}

impl PropertyDetail {
    pub fn new(property: Property, mut images: Vec<PropertyImage>, amenities: Vec<Amenity>) -> Self {
        images.sort_by_key(|image| (image.display_order, image.created_at));
        let thumbnail_url = select_thumbnail(&images).map(|image| image.url.clone());
        Self {
            property,
            thumbnail_url,
            images,
            amenities,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    pub id: Uuid,
    pub confirmation_code: String,
    pub property_id: Uuid,
    pub property_name: String,
    pub property_slug: String,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub guest_count: i32,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub nights: i64,
    pub total_price: BigDecimal,
    pub status: ReservationStatus,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationView {
    pub fn new(reservation: Reservation, property: &Property) -> Result<Self, AppError> {
        let status = reservation.status.parse()?;
        Ok(Self {
            id: reservation.id,
            confirmation_code: reservation.confirmation_code,
            property_id: reservation.property_id,
            property_name: property.name.clone(),
            property_slug: property.slug.clone(),
            guest_name: reservation.guest_name,
            guest_email: reservation.guest_email,
            guest_phone: reservation.guest_phone,
            guest_count: reservation.guest_count,
            check_in_date: reservation.check_in_date,
            check_out_date: reservation.check_out_date,
            nights: (reservation.check_out_date - reservation.check_in_date).num_days(),
            total_price: reservation.total_price,
            status,
            special_requests: reservation.special_requests,
            created_at: reservation.created_at,
            updated_at: reservation.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender: MessageSender,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InquiryMessage> for MessageView {
    type Error = AppError;

    fn try_from(message: InquiryMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            id: message.id,
            sender: message.sender.parse()?,
            body: message.body,
            created_at: message.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InquiryView {
    pub id: Uuid,
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub status: InquiryStatus,
    pub messages: Vec<MessageView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InquiryView {
    pub fn new(inquiry: Inquiry, mut messages: Vec<InquiryMessage>) -> Result<Self, AppError> {
        messages.sort_by_key(|message| message.created_at);
        let messages = messages
            .into_iter()
            .map(MessageView::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: inquiry.id,
            property_id: inquiry.property_id,
            name: inquiry.name,
            email: inquiry.email,
            phone: inquiry.phone,
            subject: inquiry.subject,
            message: inquiry.message,
            status: inquiry.status.parse()?,
            messages,
            created_at: inquiry.created_at,
            updated_at: inquiry.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}
