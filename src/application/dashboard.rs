//! Read-side rollups for the owner dashboard.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{CampaignsRepo, ContactsRepo, RepoError};
use crate::domain::entities::CampaignRecord;

const RECENT_CAMPAIGN_LIMIT: u32 = 5;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_contacts: u64,
    pub total_campaigns: u64,
    pub total_emails_sent: u64,
    pub recent_campaigns: Vec<CampaignRecord>,
}

#[derive(Clone)]
pub struct DashboardService {
    contacts: Arc<dyn ContactsRepo>,
    campaigns: Arc<dyn CampaignsRepo>,
}

impl DashboardService {
    pub fn new(contacts: Arc<dyn ContactsRepo>, campaigns: Arc<dyn CampaignsRepo>) -> Self {
        Self {
            contacts,
            campaigns,
        }
    }

    pub async fn stats(&self, owner_id: Uuid) -> Result<DashboardStats, DashboardError> {
        let total_contacts = self.contacts.count_contacts(owner_id).await?;
        let total_campaigns = self.campaigns.count_campaigns(owner_id).await?;
        let total_emails_sent = self.campaigns.total_sent(owner_id).await?;
        let recent_campaigns = self
            .campaigns
            .list_recent_campaigns(owner_id, RECENT_CAMPAIGN_LIMIT)
            .await?;

        Ok(DashboardStats {
            total_contacts,
            total_campaigns,
            total_emails_sent,
            recent_campaigns,
        })
    }
}
