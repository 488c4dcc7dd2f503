use uuid::Uuid;

use crate::domain::entities::{CampaignRecord, EmailRecord};

use super::service::CampaignService;
use super::types::{CampaignAnalytics, CampaignError, rate_percent};

impl CampaignService {
    pub async fn list_campaigns(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<CampaignRecord>, CampaignError> {
        Ok(self.campaigns.list_campaigns(owner_id).await?)
    }

    pub async fn get_campaign(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<CampaignRecord, CampaignError> {
        self.campaigns
            .find_campaign(owner_id, campaign_id)
            .await?
            .ok_or(CampaignError::CampaignNotFound)
    }

    /// Computed delivery rates from the persisted counters.
    pub async fn analytics(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<CampaignAnalytics, CampaignError> {
        let campaign = self.get_campaign(owner_id, campaign_id).await?;

        Ok(CampaignAnalytics {
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            total_recipients: campaign.recipient_count,
            sent_count: campaign.sent_count,
            delivered_count: campaign.delivered_count,
            opened_count: campaign.opened_count,
            clicked_count: campaign.clicked_count,
            failed_count: campaign.failed_count,
            open_rate: rate_percent(campaign.opened_count, campaign.sent_count),
            click_rate: rate_percent(campaign.clicked_count, campaign.sent_count),
            delivery_rate: rate_percent(campaign.delivered_count, campaign.sent_count),
        })
    }

    /// Per-recipient status list for one campaign.
    pub async fn list_emails(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Vec<EmailRecord>, CampaignError> {
        // Ownership check first so foreign campaign ids read as missing.
        self.get_campaign(owner_id, campaign_id).await?;
        Ok(self.emails.list_for_campaign(campaign_id).await?)
    }
}
