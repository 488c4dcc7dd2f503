//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{CampaignStatus, EmailEventType, EmailStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Value,
    pub subscribed: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ContactRecord {
    /// First and last name joined; empty when neither is set.
    pub fn display_name(&self) -> String {
        let mut name = String::new();
        if let Some(first) = self.first_name.as_deref() {
            name.push_str(first.trim());
        }
        if let Some(last) = self.last_name.as_deref() {
            if !name.is_empty() {
                name.push(' ');
            }
            name.push_str(last.trim());
        }
        name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub recipient_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub failed_count: i32,
    pub scheduled_at: Option<OffsetDateTime>,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailRecord {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<OffsetDateTime>,
    pub delivered_at: Option<OffsetDateTime>,
    pub opened_at: Option<OffsetDateTime>,
    pub clicked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailEventRecord {
    pub id: Uuid,
    pub email_id: Uuid,
    pub event_type: EmailEventType,
    pub event_data: serde_json::Value,
    pub created_at: OffsetDateTime,
}
