//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{CampaignRecord, ContactRecord, EmailRecord, TemplateRecord};
use crate::domain::types::{CampaignStatus, EmailStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateContactParams {
    pub owner_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Value,
    pub subscribed: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateContactParams {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Value,
    pub subscribed: bool,
}

#[async_trait]
pub trait ContactsRepo: Send + Sync {
    async fn create_contact(
        &self,
        params: CreateContactParams,
    ) -> Result<ContactRecord, RepoError>;

    async fn update_contact(
        &self,
        params: UpdateContactParams,
    ) -> Result<ContactRecord, RepoError>;

    async fn delete_contact(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError>;

    async fn find_contact(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ContactRecord>, RepoError>;

    async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRecord>, RepoError>;

    /// Contacts matching the explicit id set, restricted to the owner.
    async fn list_contacts_by_ids(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ContactRecord>, RepoError>;

    /// All currently subscribed contacts for the owner.
    async fn list_subscribed_contacts(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ContactRecord>, RepoError>;

    async fn count_contacts(&self, owner_id: Uuid) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateTemplateParams {
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTemplateParams {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait TemplatesRepo: Send + Sync {
    async fn create_template(
        &self,
        params: CreateTemplateParams,
    ) -> Result<TemplateRecord, RepoError>;

    async fn update_template(
        &self,
        params: UpdateTemplateParams,
    ) -> Result<TemplateRecord, RepoError>;

    async fn delete_template(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError>;

    async fn find_template(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TemplateRecord>, RepoError>;

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<TemplateRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateCampaignParams {
    pub owner_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub recipient_count: i32,
    pub scheduled_at: Option<OffsetDateTime>,
}

/// Per-email terminal disposition applied during the reconcile phase.
#[derive(Debug, Clone)]
pub struct EmailDisposition {
    pub email_id: Uuid,
    pub delivered: bool,
    pub failure_cause: Option<String>,
}

/// Counts accumulated by one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub sent: i32,
    pub failed: i32,
}

#[async_trait]
pub trait CampaignsRepo: Send + Sync {
    async fn create_campaign(
        &self,
        params: CreateCampaignParams,
    ) -> Result<CampaignRecord, RepoError>;

    async fn find_campaign(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CampaignRecord>, RepoError>;

    async fn list_campaigns(&self, owner_id: Uuid) -> Result<Vec<CampaignRecord>, RepoError>;

    /// Atomically transition draft/scheduled to sending, stamping `started_at`.
    ///
    /// Returns `false` when the campaign was not in an accepting state, which
    /// is how a concurrent duplicate send request loses the race.
    async fn begin_sending(
        &self,
        owner_id: Uuid,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    /// Apply one run's outcomes in a single transaction: per-email terminal
    /// state plus event rows, additive campaign counters, and the completed
    /// transition.
    async fn reconcile_run(
        &self,
        campaign_id: Uuid,
        outcomes: &[EmailDisposition],
        completed_at: OffsetDateTime,
    ) -> Result<RunTally, RepoError>;

    /// Reset campaigns stuck in sending since before `stuck_before` back to
    /// draft, together with their in-flight emails. Returns the affected ids.
    async fn reset_stuck_campaigns(
        &self,
        stuck_before: OffsetDateTime,
    ) -> Result<Vec<Uuid>, RepoError>;

    async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError>;

    async fn count_campaigns(&self, owner_id: Uuid) -> Result<u64, RepoError>;

    async fn total_sent(&self, owner_id: Uuid) -> Result<u64, RepoError>;

    async fn list_recent_campaigns(
        &self,
        owner_id: Uuid,
        limit: u32,
    ) -> Result<Vec<CampaignRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewEmailParams {
    pub campaign_id: Uuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
}

#[async_trait]
pub trait EmailsRepo: Send + Sync {
    /// Bulk-materialize the recipient snapshot at campaign creation.
    async fn insert_emails(&self, rows: &[NewEmailParams]) -> Result<u64, RepoError>;

    /// Freeze the work set for one run: every pending email of the campaign
    /// is transitioned to sending and returned. Emails already past pending
    /// are excluded, which keeps repeated runs idempotent.
    async fn snapshot_pending(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError>;

    async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError>;
}
