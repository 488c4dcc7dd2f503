use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{EmailsRepo, NewEmailParams, RepoError},
    domain::entities::EmailRecord,
    domain::types::EmailStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

const EMAIL_COLUMNS: &str = "id, campaign_id, recipient_email, recipient_name, subject, body, \
     status, error_message, sent_at, delivered_at, opened_at, clicked_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EmailRow {
    id: Uuid,
    campaign_id: Uuid,
    recipient_email: String,
    recipient_name: String,
    subject: String,
    body: String,
    status: EmailStatus,
    error_message: Option<String>,
    sent_at: Option<OffsetDateTime>,
    delivered_at: Option<OffsetDateTime>,
    opened_at: Option<OffsetDateTime>,
    clicked_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EmailRow> for EmailRecord {
    fn from(row: EmailRow) -> Self {
        Self {
            id: row.id,
            campaign_id: row.campaign_id,
            recipient_email: row.recipient_email,
            recipient_name: row.recipient_name,
            subject: row.subject,
            body: row.body,
            status: row.status,
            error_message: row.error_message,
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            opened_at: row.opened_at,
            clicked_at: row.clicked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EmailsRepo for PostgresRepositories {
    async fn insert_emails(&self, rows: &[NewEmailParams]) -> Result<u64, RepoError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                "INSERT INTO emails (id, campaign_id, recipient_email, recipient_name, subject, \
                     body, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::new_v4())
            .bind(row.campaign_id)
            .bind(&row.recipient_email)
            .bind(&row.recipient_name)
            .bind(&row.subject)
            .bind(&row.body)
            .bind(row.status)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(inserted)
    }

    async fn snapshot_pending(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError> {
        // One statement both freezes the work set and marks it in flight, so
        // a concurrent run of the same campaign cannot pick up the same rows.
        let sql = format!(
            "UPDATE emails \
                SET status = 'sending'::email_status, updated_at = now() \
              WHERE campaign_id = $1 AND status = 'pending'::email_status \
             RETURNING {EMAIL_COLUMNS}"
        );

        let rows = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(campaign_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError> {
        let sql = format!(
            "SELECT {EMAIL_COLUMNS} FROM emails \
              WHERE campaign_id = $1 \
              ORDER BY created_at ASC, id ASC"
        );

        let rows = sqlx::query_as::<_, EmailRow>(&sql)
            .bind(campaign_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
