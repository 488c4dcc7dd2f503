use async_trait::async_trait;

use crate::application::repos::RepoError;

use super::send_campaign::SendCampaignJobPayload;

/// Durable queue for send jobs. The job row outlives the process that
/// accepted the HTTP request; a restart resumes queued sends. A trait seam
/// so services can be exercised against a recording fake without a database.
#[async_trait]
pub trait SendJobQueue: Send + Sync {
    /// Persist a send job and return its assigned id.
    async fn enqueue(&self, payload: SendCampaignJobPayload) -> Result<String, RepoError>;
}
