use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::info;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use crate::{AppError, DbPool};

const NAME_KEY: &str = "amenities_name_key";

pub struct AmenityManager {
    pool: DbPool,
}

impl AmenityManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Amenity>, AppError> {
        let mut conn = self.pool.get().await?;

        let rows = amenities::table
            .order(amenities::name.asc())
            .select(Amenity::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows)
    }

    pub async fn create(&self, name: String, icon: Option<String>) -> Result<Amenity, AppError> {
        let mut conn = self.pool.get().await?;

        let new_amenity = NewAmenity {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            icon,
        };

        let amenity = diesel::insert_into(amenities::table)
            .values(&new_amenity)
            .returning(Amenity::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(duplicate_name)?;

        info!("Amenity {} created", amenity.name);
        Ok(amenity)
    }

    pub async fn update(&self, id: Uuid, mut changes: AmenityChangeset) -> Result<Amenity, AppError> {
        let mut conn = self.pool.get().await?;
        changes.name = changes.name.map(|name| name.trim().to_string());

        if changes.name.is_none() && changes.icon.is_none() {
            return amenities::table
                .find(id)
                .select(Amenity::as_select())
                .first(&mut conn)
                .await
                .optional()?
                .ok_or(AppError::NotFound("amenity"));
        }

        diesel::update(amenities::table.find(id))
            .set(&changes)
            .returning(Amenity::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(duplicate_name)?
            .ok_or(AppError::NotFound("amenity"))
    }

    /// Property links go with it (ON DELETE CASCADE).
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(amenities::table.find(id))
            .execute(&mut conn)
            .await?;

        if deleted == 0 {
            return Err(AppError::NotFound("amenity"));
        }

        info!("Amenity {} deleted", id);
        Ok(())
    }
}

fn duplicate_name(err: diesel::result::Error) -> AppError {
    if crate::error::violates(&err, NAME_KEY) {
        AppError::Validation("an amenity with this name already exists".to_string())
    } else {
        AppError::Database(err)
    }
}
