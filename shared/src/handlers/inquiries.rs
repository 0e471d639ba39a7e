use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;
use uuid::Uuid;

use crate::models::*;
use crate::schema::*;
use crate::views::InquiryView;
use crate::{AppError, DbPool, InquiryStatus, MessageSender};

#[derive(Debug, Clone)]
pub struct NewInquiryInput {
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

pub struct InquiryManager {
    pool: DbPool,
}

impl InquiryManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewInquiryInput) -> Result<InquiryView, AppError> {
        let mut conn = self.pool.get().await?;

        if let Some(property_id) = input.property_id {
            let exists = properties::table
                .find(property_id)
                .select(properties::id)
                .first::<Uuid>(&mut conn)
                .await
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound("property"));
            }
        }

        let new_inquiry = NewInquiry {
            id: Uuid::new_v4(),
            property_id: input.property_id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            subject: input.subject,
            message: input.message,
            status: InquiryStatus::Open.as_str().to_string(),
        };

        let inquiry = diesel::insert_into(inquiries::table)
            .values(&new_inquiry)
            .returning(Inquiry::as_returning())
            .get_result(&mut conn)
            .await?;

        info!("Inquiry {} received", inquiry.id);
        InquiryView::new(inquiry, Vec::new())
    }

    pub async fn get(&self, id: Uuid) -> Result<InquiryView, AppError> {
        let mut conn = self.pool.get().await?;
        let inquiry = find(&mut conn, id).await?;
        with_messages(&mut conn, inquiry).await
    }

    /// Guests can only read their own thread: the email on file must match.
    pub async fn get_for_guest(&self, id: Uuid, email: &str) -> Result<InquiryView, AppError> {
        let mut conn = self.pool.get().await?;
        let inquiry = find(&mut conn, id).await?;

        if !inquiry.email.trim().eq_ignore_ascii_case(email.trim()) {
            return Err(AppError::NotFound("inquiry"));
        }

        with_messages(&mut conn, inquiry).await
    }

    pub async fn list(&self, status: Option<InquiryStatus>) -> Result<Vec<InquiryView>, AppError> {
        let mut conn = self.pool.get().await?;

        let mut query = inquiries::table.into_boxed();
        if let Some(status) = status {
            query = query.filter(inquiries::status.eq(status.as_str()));
        }

        let rows = query
            .order(inquiries::created_at.desc())
            .select(Inquiry::as_select())
            .load(&mut conn)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|inquiry| inquiry.id).collect();
        let messages = inquiry_messages::table
            .filter(inquiry_messages::inquiry_id.eq_any(&ids))
            .select(InquiryMessage::as_select())
            .load(&mut conn)
            .await?;

        let mut by_inquiry: HashMap<Uuid, Vec<InquiryMessage>> = HashMap::new();
        for message in messages {
            by_inquiry.entry(message.inquiry_id).or_default().push(message);
        }

        rows.into_iter()
            .map(|inquiry| {
                let messages = by_inquiry.remove(&inquiry.id).unwrap_or_default();
                InquiryView::new(inquiry, messages)
            })
            .collect()
    }

    /// Records an admin reply and marks the inquiry answered in one
    /// transaction.
    pub async fn reply(&self, id: Uuid, body: String) -> Result<InquiryView, AppError> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let exists = inquiries::table
                    .find(id)
                    .select(inquiries::id)
                    .for_update()
                    .first::<Uuid>(conn)
                    .await
                    .optional()?;
                if exists.is_none() {
                    return Err(AppError::NotFound("inquiry"));
                }

                let reply = NewInquiryMessage {
                    id: Uuid::new_v4(),
                    inquiry_id: id,
                    sender: MessageSender::Admin.as_str().to_string(),
                    body,
                };
                diesel::insert_into(inquiry_messages::table)
                    .values(&reply)
                    .execute(conn)
                    .await?;

                diesel::update(inquiries::table.find(id))
                    .set((
                        inquiries::status.eq(InquiryStatus::Answered.as_str()),
                        inquiries::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await?;

        info!("Reply recorded for inquiry {}", id);
        self.get(id).await
    }

    pub async fn set_status(&self, id: Uuid, status: InquiryStatus) -> Result<InquiryView, AppError> {
        let mut conn = self.pool.get().await?;

        let inquiry = diesel::update(inquiries::table.find(id))
            .set((
                inquiries::status.eq(status.as_str()),
                inquiries::updated_at.eq(Utc::now()),
            ))
            .returning(Inquiry::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?
            .ok_or(AppError::NotFound("inquiry"))?;

        with_messages(&mut conn, inquiry).await
    }
}

async fn find(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Inquiry, AppError> {
    inquiries::table
        .find(id)
        .select(Inquiry::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or(AppError::NotFound("inquiry"))
}

async fn with_messages(conn: &mut AsyncPgConnection, inquiry: Inquiry) -> Result<InquiryView, AppError> {
    let messages = inquiry_messages::table
        .filter(inquiry_messages::inquiry_id.eq(inquiry.id))
        .order(inquiry_messages::created_at.asc())
        .select(InquiryMessage::as_select())
        .load(conn)
        .await?;

    InquiryView::new(inquiry, messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_property, TestDb};
    use axum::http::StatusCode;

    fn question(property_id: Option<Uuid>) -> NewInquiryInput {
        NewInquiryInput {
            property_id,
            name: "Jun Seo".to_string(),
            email: "Jun@Example.com".to_string(),
            phone: None,
            subject: "Parking".to_string(),
            message: "Is there parking for one car?".to_string(),
        }
    }

    #[tokio::test]
    async fn reply_records_message_and_answers_together() {
        let Some(db) = TestDb::new().await else { return };
        let property_id = seed_property(&db.pool, "harbour-loft", 4).await;
        let manager = InquiryManager::new(db.pool.clone());

        let inquiry = manager.create(question(Some(property_id))).await.unwrap();
        assert_eq!(inquiry.status, InquiryStatus::Open);

        let answered = manager
            .reply(inquiry.id, "Yes, one space in the courtyard.".to_string())
            .await
            .unwrap();
        assert_eq!(answered.status, InquiryStatus::Answered);
        assert_eq!(answered.messages.len(), 1);
        assert_eq!(answered.messages[0].sender, MessageSender::Admin);

        let open = manager.list(Some(InquiryStatus::Open)).await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn reply_to_missing_inquiry_leaves_nothing_behind() {
        let Some(db) = TestDb::new().await else { return };
        let manager = InquiryManager::new(db.pool.clone());

        let err = manager
            .reply(Uuid::new_v4(), "Hello?".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let mut conn = db.pool.get().await.unwrap();
        let stored: i64 = inquiry_messages::table
            .count()
            .get_result(&mut conn)
            .await
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[tokio::test]
    async fn guests_read_their_thread_by_email() {
        let Some(db) = TestDb::new().await else { return };
        let manager = InquiryManager::new(db.pool.clone());
        let inquiry = manager.create(question(None)).await.unwrap();

        let own = manager
            .get_for_guest(inquiry.id, " jun@example.COM ")
            .await
            .unwrap();
        assert_eq!(own.id, inquiry.id);

        let err = manager
            .get_for_guest(inquiry.id, "someone@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = manager.create(question(Some(Uuid::new_v4()))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
