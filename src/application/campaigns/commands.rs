use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::jobs::SendCampaignJobPayload;
use crate::application::repos::{CreateCampaignParams, NewEmailParams};
use crate::domain::entities::CampaignRecord;
use crate::domain::types::{CampaignStatus, EmailStatus};

use super::service::CampaignService;
use super::types::{CampaignError, CreateCampaignCommand, SendAccepted, ensure_non_empty};

impl CampaignService {
    /// Create a campaign and materialize one email row per recipient.
    ///
    /// Recipients are snapshotted here: later contact edits do not reach the
    /// already-created rows. Template subject and body are copied verbatim;
    /// placeholder rendering happens per recipient at dispatch time.
    pub async fn create_campaign(
        &self,
        owner_id: Uuid,
        command: CreateCampaignCommand,
    ) -> Result<CampaignRecord, CampaignError> {
        ensure_non_empty(&command.name, "name")?;

        let template = self
            .templates
            .find_template(owner_id, command.template_id)
            .await?
            .ok_or(CampaignError::TemplateNotFound)?;

        let recipients = if command.contact_ids.is_empty() {
            self.contacts.list_subscribed_contacts(owner_id).await?
        } else {
            self.contacts
                .list_contacts_by_ids(owner_id, &command.contact_ids)
                .await?
        };

        let status = if command.scheduled_at.is_some() {
            CampaignStatus::Scheduled
        } else {
            CampaignStatus::Draft
        };

        let campaign = self
            .campaigns
            .create_campaign(CreateCampaignParams {
                owner_id,
                template_id: template.id,
                name: command.name,
                status,
                recipient_count: recipients.len() as i32,
                scheduled_at: command.scheduled_at,
            })
            .await?;

        let rows: Vec<NewEmailParams> = recipients
            .iter()
            .map(|contact| NewEmailParams {
                campaign_id: campaign.id,
                recipient_email: contact.email.clone(),
                recipient_name: contact.display_name(),
                subject: template.subject.clone(),
                body: template.body.clone(),
                status: EmailStatus::Pending,
            })
            .collect();
        self.emails.insert_emails(&rows).await?;

        info!(
            target = "application::campaigns::create",
            campaign_id = %campaign.id,
            recipients = rows.len(),
            "campaign created"
        );

        Ok(campaign)
    }

    /// Accept a send request: win the status race, then queue the durable
    /// send job. The sending transition is committed before the job exists,
    /// so a concurrent duplicate request observes `sending` and is rejected
    /// without touching any email row.
    pub async fn send_campaign(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<SendAccepted, CampaignError> {
        let campaign = self
            .campaigns
            .find_campaign(owner_id, campaign_id)
            .await?
            .ok_or(CampaignError::CampaignNotFound)?;

        let accepted = self
            .campaigns
            .begin_sending(owner_id, campaign_id, OffsetDateTime::now_utc())
            .await?;
        if !accepted {
            // Losing the conditional update means another request holds the
            // campaign; re-read so the rejection names the current status.
            let status = self
                .campaigns
                .find_campaign(owner_id, campaign_id)
                .await?
                .map_or(campaign.status, |current| current.status);
            return Err(CampaignError::StatusConflict(status));
        }

        let job_id = self
            .queue
            .enqueue(SendCampaignJobPayload {
                campaign_id,
                owner_id,
            })
            .await?;

        info!(
            target = "application::campaigns::send",
            campaign_id = %campaign_id,
            job_id = %job_id,
            recipients = campaign.recipient_count,
            "send accepted"
        );

        Ok(SendAccepted {
            campaign_id,
            recipient_count: campaign.recipient_count,
            job_id,
        })
    }

    /// Delete a campaign and its cascade. Rejected while a send is running.
    pub async fn delete_campaign(
        &self,
        owner_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), CampaignError> {
        let campaign = self
            .campaigns
            .find_campaign(owner_id, campaign_id)
            .await?
            .ok_or(CampaignError::CampaignNotFound)?;

        if campaign.status == CampaignStatus::Sending {
            return Err(CampaignError::StatusConflict(campaign.status));
        }

        self.campaigns.delete_campaign(owner_id, campaign_id).await?;
        Ok(())
    }
}
