use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use crate::{AppError, DbPool};

const CODE_KEY: &str = "access_codes_code_key";
pub const DEFAULT_LOG_LIMIT: i64 = 100;
pub const MAX_LOG_LIMIT: i64 = 500;

/// Who is presenting an access code, as far as the request tells us.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub access_code_id: Uuid,
    pub label: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAccessCodeInput {
    pub code: String,
    pub label: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessLogFilter {
    pub access_code_id: Option<Uuid>,
    pub success: Option<bool>,
    pub limit: Option<i64>,
}

enum Verification {
    Granted(AccessGrant),
    Denied { access_code_id: Option<Uuid> },
}

pub struct AccessManager {
    pool: DbPool,
}

impl AccessManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Checks a guest-supplied code. Every attempt is logged; a successful
    /// one also consumes a use.
    pub async fn verify(&self, code: &str, client: ClientInfo) -> Result<AccessGrant, AppError> {
        let code = code.trim().to_string();
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        let attempted = code.clone();
        let success_client = client.clone();
        let verification = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let found = access_codes::table
                        .filter(access_codes::code.eq(&attempted))
                        .select(AccessCode::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;

                    let access_code = match found {
                        Some(access_code) if access_code.admits(now) => access_code,
                        other => {
                            return Ok(Verification::Denied {
                                access_code_id: other.map(|c| c.id),
                            })
                        }
                    };

                    diesel::update(access_codes::table.find(access_code.id))
                        .set(access_codes::use_count.eq(access_codes::use_count + 1))
                        .execute(conn)
                        .await?;

                    record_attempt(conn, Some(access_code.id), &attempted, true, &success_client).await?;

                    Ok(Verification::Granted(AccessGrant {
                        access_code_id: access_code.id,
                        label: access_code.label,
                        expires_at: access_code.expires_at,
                    }))
                })
            })
            .await?;

        match verification {
            Verification::Granted(grant) => {
                info!("Access code {} accepted", grant.access_code_id);
                Ok(grant)
            }
            Verification::Denied { access_code_id } => {
                if let Err(e) = record_attempt(&mut conn, access_code_id, &code, false, &client).await {
                    warn!("Failed to record rejected access attempt: {}", e);
                }
                info!("Access code rejected");
                Err(AppError::AccessDenied)
            }
        }
    }

    pub async fn create(&self, input: NewAccessCodeInput) -> Result<AccessCode, AppError> {
        let mut conn = self.pool.get().await?;

        let new_code = NewAccessCode {
            id: Uuid::new_v4(),
            code: input.code.trim().to_string(),
            label: input.label,
            is_active: true,
            expires_at: input.expires_at,
            max_uses: input.max_uses,
        };

        let access_code = diesel::insert_into(access_codes::table)
            .values(&new_code)
            .returning(AccessCode::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
            .map_err(|err| {
                if err.violates(CODE_KEY) {
                    AppError::Validation("access code already exists".to_string())
                } else {
                    err
                }
            })?;

        info!("Access code {} created", access_code.id);
        Ok(access_code)
    }

    pub async fn list(&self) -> Result<Vec<AccessCode>, AppError> {
        let mut conn = self.pool.get().await?;

        let codes = access_codes::table
            .order(access_codes::created_at.desc())
            .select(AccessCode::as_select())
            .load(&mut conn)
            .await?;

        Ok(codes)
    }

    pub async fn update(&self, id: Uuid, changes: AccessCodeChangeset) -> Result<AccessCode, AppError> {
        let mut conn = self.pool.get().await?;

        let current = access_codes::table
            .find(id)
            .select(AccessCode::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("access code"))?;

        let no_changes = changes.label.is_none()
            && changes.is_active.is_none()
            && changes.expires_at.is_none()
            && changes.max_uses.is_none();
        if no_changes {
            return Ok(current);
        }

        let updated = diesel::update(access_codes::table.find(id))
            .set(&changes)
            .returning(AccessCode::as_returning())
            .get_result(&mut conn)
            .await?;

        info!("Access code {} updated", id);
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(access_codes::table.find(id))
            .execute(&mut conn)
            .await?;

        if deleted == 0 {
            return Err(AppError::NotFound("access code"));
        }

        info!("Access code {} deleted", id);
        Ok(())
    }

    pub async fn logs(&self, filter: AccessLogFilter) -> Result<Vec<AccessLog>, AppError> {
        let mut conn = self.pool.get().await?;

        let mut query = access_logs::table.into_boxed();
        if let Some(access_code_id) = filter.access_code_id {
            query = query.filter(access_logs::access_code_id.eq(access_code_id));
        }
        if let Some(success) = filter.success {
            query = query.filter(access_logs::success.eq(success));
        }

        let limit = filter.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        let logs = query
            .order(access_logs::created_at.desc())
            .limit(limit)
            .select(AccessLog::as_select())
            .load(&mut conn)
            .await?;

        Ok(logs)
    }
}

async fn record_attempt(
    conn: &mut AsyncPgConnection,
    access_code_id: Option<Uuid>,
    code: &str,
    success: bool,
    client: &ClientInfo,
) -> Result<(), AppError> {
    let log = NewAccessLog {
        id: Uuid::new_v4(),
        access_code_id,
        code_attempted: code.to_string(),
        success,
        ip_address: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
    };

    diesel::insert_into(access_logs::table)
        .values(&log)
        .execute(conn)
        .await?;

    Ok(())
}
