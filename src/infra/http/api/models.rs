//! Request payloads for the JSON API. Responses serialize the domain
//! records and service types directly.

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default = "default_custom_fields")]
    pub custom_fields: serde_json::Value,
    #[serde(default = "default_subscribed")]
    pub subscribed: bool,
}

fn default_custom_fields() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_subscribed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CampaignCreateRequest {
    pub name: String,
    pub template_id: Uuid,
    #[serde(default)]
    pub contact_ids: Vec<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
}
