use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CampaignsRepo, CreateCampaignParams, EmailDisposition, RepoError, RunTally,
    },
    domain::entities::CampaignRecord,
    domain::types::CampaignStatus,
};

use super::{PostgresRepositories, map_sqlx_error};

const CAMPAIGN_COLUMNS: &str = "id, owner_id, template_id, name, status, recipient_count, \
     sent_count, delivered_count, opened_count, clicked_count, failed_count, \
     scheduled_at, started_at, completed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    owner_id: Uuid,
    template_id: Uuid,
    name: String,
    status: CampaignStatus,
    recipient_count: i32,
    sent_count: i32,
    delivered_count: i32,
    opened_count: i32,
    clicked_count: i32,
    failed_count: i32,
    scheduled_at: Option<OffsetDateTime>,
    started_at: Option<OffsetDateTime>,
    completed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CampaignRow> for CampaignRecord {
    fn from(row: CampaignRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            template_id: row.template_id,
            name: row.name,
            status: row.status,
            recipient_count: row.recipient_count,
            sent_count: row.sent_count,
            delivered_count: row.delivered_count,
            opened_count: row.opened_count,
            clicked_count: row.clicked_count,
            failed_count: row.failed_count,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CampaignsRepo for PostgresRepositories {
    async fn create_campaign(
        &self,
        params: CreateCampaignParams,
    ) -> Result<CampaignRecord, RepoError> {
        let sql = format!(
            "INSERT INTO campaigns (id, owner_id, template_id, name, status, recipient_count, \
                 scheduled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {CAMPAIGN_COLUMNS}"
        );

        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.owner_id)
            .bind(params.template_id)
            .bind(&params.name)
            .bind(params.status)
            .bind(params.recipient_count)
            .bind(params.scheduled_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_campaign(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CampaignRecord>, RepoError> {
        let sql =
            format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 AND owner_id = $2");

        let row = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_campaigns(&self, owner_id: Uuid) -> Result<Vec<CampaignRecord>, RepoError> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
              WHERE owner_id = $1 \
              ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn begin_sending(
        &self,
        owner_id: Uuid,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        // Conditional update, not read-then-write: two racing send requests
        // both reach here, but only one matches the accepting states.
        let result = sqlx::query(
            "UPDATE campaigns \
                SET status = 'sending'::campaign_status, started_at = $3, updated_at = now() \
              WHERE id = $1 AND owner_id = $2 \
                AND status IN ('draft'::campaign_status, 'scheduled'::campaign_status)",
        )
        .bind(id)
        .bind(owner_id)
        .bind(started_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn reconcile_run(
        &self,
        campaign_id: Uuid,
        outcomes: &[EmailDisposition],
        completed_at: OffsetDateTime,
    ) -> Result<RunTally, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut tally = RunTally::default();

        for outcome in outcomes {
            if outcome.delivered {
                let updated = sqlx::query(
                    "UPDATE emails \
                        SET status = 'sent'::email_status, sent_at = $3, error_message = NULL, \
                            updated_at = now() \
                      WHERE id = $1 AND campaign_id = $2 \
                        AND status = 'sending'::email_status",
                )
                .bind(outcome.email_id)
                .bind(campaign_id)
                .bind(completed_at)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;

                // A row that vanished or already advanced is skipped, never
                // regressed.
                if updated.rows_affected() == 0 {
                    continue;
                }

                sqlx::query(
                    "INSERT INTO email_events (id, email_id, event_type, event_data) \
                     VALUES ($1, $2, 'sent'::email_event_type, $3)",
                )
                .bind(Uuid::new_v4())
                .bind(outcome.email_id)
                .bind(serde_json::json!({}))
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;

                tally.sent += 1;
            } else {
                let cause = outcome.failure_cause.as_deref().unwrap_or("delivery failed");
                let updated = sqlx::query(
                    "UPDATE emails \
                        SET status = 'failed'::email_status, error_message = $3, \
                            updated_at = now() \
                      WHERE id = $1 AND campaign_id = $2 \
                        AND status = 'sending'::email_status",
                )
                .bind(outcome.email_id)
                .bind(campaign_id)
                .bind(cause)
                .execute(tx.as_mut())
                .await
                .map_err(map_sqlx_error)?;

                if updated.rows_affected() == 0 {
                    continue;
                }

                tally.failed += 1;
            }
        }

        // Additive counter updates keep repeated or split reconciles correct.
        // Partial failures still complete the campaign.
        sqlx::query(
            "UPDATE campaigns \
                SET sent_count = sent_count + $2, \
                    failed_count = failed_count + $3, \
                    status = 'completed'::campaign_status, \
                    completed_at = $4, \
                    updated_at = now() \
              WHERE id = $1",
        )
        .bind(campaign_id)
        .bind(tally.sent)
        .bind(tally.failed)
        .bind(completed_at)
        .execute(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(tally)
    }

    async fn reset_stuck_campaigns(
        &self,
        stuck_before: OffsetDateTime,
    ) -> Result<Vec<Uuid>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let reset: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE campaigns \
                SET status = 'draft'::campaign_status, started_at = NULL, updated_at = now() \
              WHERE status = 'sending'::campaign_status \
                AND started_at IS NOT NULL AND started_at < $1 \
             RETURNING id",
        )
        .bind(stuck_before)
        .fetch_all(tx.as_mut())
        .await
        .map_err(map_sqlx_error)?;

        let ids: Vec<Uuid> = reset.into_iter().map(|(id,)| id).collect();

        if !ids.is_empty() {
            sqlx::query(
                "UPDATE emails \
                    SET status = 'pending'::email_status, updated_at = now() \
                  WHERE campaign_id = ANY($1) AND status = 'sending'::email_status",
            )
            .bind(&ids)
            .execute(tx.as_mut())
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query(
            "DELETE FROM campaigns \
              WHERE id = $1 AND owner_id = $2 AND status <> 'sending'::campaign_status",
        )
        .bind(id)
        .bind(owner_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn count_campaigns(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM campaigns WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_count(count)
    }

    async fn total_sent(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(sum(sent_count), 0)::bigint FROM campaigns WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        convert_count(total)
    }

    async fn list_recent_campaigns(
        &self,
        owner_id: Uuid,
        limit: u32,
    ) -> Result<Vec<CampaignRecord>, RepoError> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
              WHERE owner_id = $1 \
              ORDER BY created_at DESC, id DESC \
              LIMIT $2"
        );

        let rows = sqlx::query_as::<_, CampaignRow>(&sql)
            .bind(owner_id)
            .bind(limit as i64)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

fn convert_count(value: i64) -> Result<u64, RepoError> {
    value
        .try_into()
        .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
}
