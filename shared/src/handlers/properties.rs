use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;
use uuid::Uuid;

use crate::error::is_foreign_key_violation;
use crate::models::*;
use crate::schema::*;
use crate::views::{PropertyDetail, PropertySummary};
use crate::{AppError, DbPool};

const SLUG_KEY: &str = "properties_slug_key";

#[derive(Debug, Clone)]
pub struct NewPropertyInput {
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
    pub amenity_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyChanges {
    pub fields: PropertyChangeset,
    /// Replaces the amenity links when present.
    pub amenity_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct NewImageInput {
    pub url: String,
    pub storage_path: Option<String>,
    pub display_order: i32,
    pub is_thumbnail: bool,
}

pub struct PropertyManager {
    pool: DbPool,
}

impl PropertyManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_visible(&self) -> Result<Vec<PropertySummary>, AppError> {
        let mut conn = self.pool.get().await?;

        let rows = properties::table
            .filter(properties::is_visible.eq(true))
            .order(properties::created_at.desc())
            .select(Property::as_select())
            .load(&mut conn)
            .await?;

        summarize(&mut conn, rows).await
    }

    pub async fn list_all(&self) -> Result<Vec<PropertySummary>, AppError> {
        let mut conn = self.pool.get().await?;

        let rows = properties::table
            .order(properties::created_at.desc())
            .select(Property::as_select())
            .load(&mut conn)
            .await?;

        summarize(&mut conn, rows).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<PropertyDetail, AppError> {
        let mut conn = self.pool.get().await?;
        let property = find_visible_by_slug(&mut conn, slug).await?;
        load_detail(&mut conn, property).await
    }

    pub async fn resolve_visible_slug(&self, slug: &str) -> Result<Property, AppError> {
        let mut conn = self.pool.get().await?;
        find_visible_by_slug(&mut conn, slug).await
    }

    pub async fn get_detail(&self, id: Uuid) -> Result<PropertyDetail, AppError> {
        let mut conn = self.pool.get().await?;

        let property = properties::table
            .find(id)
            .select(Property::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("property"))?;

        load_detail(&mut conn, property).await
    }

    pub async fn create(&self, input: NewPropertyInput) -> Result<PropertyDetail, AppError> {
        let mut conn = self.pool.get().await?;
        let property_id = Uuid::new_v4();

        let new_property = NewProperty {
            id: property_id,
            slug: input.slug,
            name: input.name,
            description: input.description,
            address: input.address,
            address_en: input.address_en,
            max_guests: input.max_guests,
            bedrooms: input.bedrooms,
            bathrooms: input.bathrooms,
            price_per_night: input.price_per_night,
            is_visible: input.is_visible,
        };
        let amenity_ids = input.amenity_ids;

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(properties::table)
                    .values(&new_property)
                    .execute(conn)
                    .await?;

                link_amenities(conn, property_id, &amenity_ids).await?;

                Ok(())
            })
        })
        .await
        .map_err(translate_write_error)?;

        info!("Property {} created", property_id);

        self.get_detail(property_id).await
    }

    pub async fn update(&self, id: Uuid, changes: PropertyChanges) -> Result<PropertyDetail, AppError> {
        let mut conn = self.pool.get().await?;
        let PropertyChanges { fields, amenity_ids } = changes;

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let updated = diesel::update(properties::table.find(id))
                    .set((&fields, properties::updated_at.eq(Utc::now())))
                    .execute(conn)
                    .await?;

                if updated == 0 {
                    return Err(AppError::NotFound("property"));
                }

                if let Some(amenity_ids) = amenity_ids {
                    diesel::delete(
                        property_amenities::table.filter(property_amenities::property_id.eq(id)),
                    )
                    .execute(conn)
                    .await?;

                    link_amenities(conn, id, &amenity_ids).await?;
                }

                Ok(())
            })
        })
        .await
        .map_err(translate_write_error)?;

        info!("Property {} updated", id);

        self.get_detail(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let reservation_count: i64 = reservations::table
                    .filter(reservations::property_id.eq(id))
                    .count()
                    .get_result(conn)
                    .await?;

                if reservation_count > 0 {
                    return Err(AppError::Validation(
                        "property has reservations; hide it instead of deleting".to_string(),
                    ));
                }

                diesel::delete(property_images::table.filter(property_images::property_id.eq(id)))
                    .execute(conn)
                    .await?;
                diesel::delete(
                    property_amenities::table.filter(property_amenities::property_id.eq(id)),
                )
                .execute(conn)
                .await?;

                let deleted = diesel::delete(properties::table.find(id))
                    .execute(conn)
                    .await?;

                if deleted == 0 {
                    return Err(AppError::NotFound("property"));
                }

                Ok(())
            })
        })
        .await?;

        info!("Property {} deleted", id);
        Ok(())
    }

    pub async fn add_image(&self, property_id: Uuid, input: NewImageInput) -> Result<PropertyImage, AppError> {
        let mut conn = self.pool.get().await?;

        let image = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let exists = properties::table
                        .find(property_id)
                        .select(properties::id)
                        .for_update()
                        .first::<Uuid>(conn)
                        .await
                        .optional()?;

                    if exists.is_none() {
                        return Err(AppError::NotFound("property"));
                    }

                    if input.is_thumbnail {
                        diesel::update(
                            property_images::table
                                .filter(property_images::property_id.eq(property_id)),
                        )
                        .set(property_images::is_thumbnail.eq(false))
                        .execute(conn)
                        .await?;
                    }

                    let new_image = NewPropertyImage {
                        id: Uuid::new_v4(),
                        property_id,
                        url: input.url,
                        storage_path: input.storage_path,
                        display_order: input.display_order,
                        is_thumbnail: input.is_thumbnail,
                    };

                    let image = diesel::insert_into(property_images::table)
                        .values(&new_image)
                        .returning(PropertyImage::as_returning())
                        .get_result(conn)
                        .await?;

                    Ok(image)
                })
            })
            .await?;

        info!("Image {} added to property {}", image.id, property_id);
        Ok(image)
    }

    pub async fn remove_image(&self, property_id: Uuid, image_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(
            property_images::table
                .filter(property_images::id.eq(image_id))
                .filter(property_images::property_id.eq(property_id)),
        )
        .execute(&mut conn)
        .await?;

        if deleted == 0 {
            return Err(AppError::NotFound("image"));
        }

        info!("Image {} removed from property {}", image_id, property_id);
        Ok(())
    }
}

fn translate_write_error(err: AppError) -> AppError {
    if err.violates(SLUG_KEY) {
        AppError::Validation("slug is already in use".to_string())
    } else if is_foreign_key_violation(&err) {
        AppError::Validation("unknown amenity".to_string())
    } else {
        err
    }
}

async fn link_amenities(
    conn: &mut AsyncPgConnection,
    property_id: Uuid,
    amenity_ids: &[Uuid],
) -> Result<(), AppError> {
    if amenity_ids.is_empty() {
        return Ok(());
    }

    let mut unique = amenity_ids.to_vec();
    unique.sort();
    unique.dedup();

    let links: Vec<PropertyAmenity> = unique
        .into_iter()
        .map(|amenity_id| PropertyAmenity {
            property_id,
            amenity_id,
        })
        .collect();

    diesel::insert_into(property_amenities::table)
        .values(&links)
        .execute(conn)
        .await?;

    Ok(())
}

async fn find_visible_by_slug(conn: &mut AsyncPgConnection, slug: &str) -> Result<Property, AppError> {
    properties::table
        .filter(properties::slug.eq(slug))
        .filter(properties::is_visible.eq(true))
        .select(Property::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or(AppError::NotFound("property"))
}

async fn load_detail(conn: &mut AsyncPgConnection, property: Property) -> Result<PropertyDetail, AppError> {
    let images = property_images::table
        .filter(property_images::property_id.eq(property.id))
        .select(PropertyImage::as_select())
        .load(conn)
        .await?;

    let amenities = property_amenities::table
        .inner_join(amenities::table)
        .filter(property_amenities::property_id.eq(property.id))
        .order(amenities::name.asc())
        .select(Amenity::as_select())
        .load(conn)
        .await?;

    Ok(PropertyDetail::new(property, images, amenities))
}

/// Attaches thumbnails and amenities to a batch of properties with one query
/// per relation.
pub(crate) async fn summarize(
    conn: &mut AsyncPgConnection,
    rows: Vec<Property>,
) -> Result<Vec<PropertySummary>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|property| property.id).collect();

    let images = property_images::table
        .filter(property_images::property_id.eq_any(&ids))
        .select(PropertyImage::as_select())
        .load(conn)
        .await?;

    let links = property_amenities::table
        .inner_join(amenities::table)
        .filter(property_amenities::property_id.eq_any(&ids))
        .order(amenities::name.asc())
        .select((property_amenities::property_id, Amenity::as_select()))
        .load::<(Uuid, Amenity)>(conn)
        .await?;

    let mut images_by_property: HashMap<Uuid, Vec<PropertyImage>> = HashMap::new();
    for image in images {
        images_by_property.entry(image.property_id).or_default().push(image);
    }

    let mut amenities_by_property: HashMap<Uuid, Vec<Amenity>> = HashMap::new();
    for (property_id, amenity) in links {
        amenities_by_property.entry(property_id).or_default().push(amenity);
    }

    Ok(rows
        .into_iter()
        .map(|property| {
            let images = images_by_property.remove(&property.id).unwrap_or_default();
            let amenities = amenities_by_property.remove(&property.id).unwrap_or_default();
            PropertySummary::new(property, &images, amenities)
        })
        .collect())
}
