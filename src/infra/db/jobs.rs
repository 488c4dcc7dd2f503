use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::jobs::{SEND_CAMPAIGN_QUEUE, SendCampaignJobPayload, SendJobQueue};
use crate::application::repos::RepoError;

use super::{PostgresRepositories, map_sqlx_error};

/// Whole-procedure retries are safe: the pending-only snapshot keeps a
/// repeated run from re-sending settled emails.
const SEND_JOB_MAX_ATTEMPTS: i32 = 3;

#[async_trait]
impl SendJobQueue for PostgresRepositories {
    async fn enqueue(&self, payload: SendCampaignJobPayload) -> Result<String, RepoError> {
        let payload = serde_json::to_value(&payload)
            .map_err(|err| RepoError::from_persistence(err.to_string()))?;

        let id: String = sqlx::query_scalar(
            "SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id",
        )
        .bind(SEND_CAMPAIGN_QUEUE)
        .bind(payload)
        .bind("Pending")
        .bind(OffsetDateTime::now_utc())
        .bind(SEND_JOB_MAX_ATTEMPTS)
        .bind(0_i32)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }
}
