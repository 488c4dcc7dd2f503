use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{application::repos::RepoError, domain::types::CampaignStatus};

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("template not found")]
    TemplateNotFound,
    #[error("campaign not found")]
    CampaignNotFound,
    #[error("campaign is {}", .0.as_str())]
    StatusConflict(CampaignStatus),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateCampaignCommand {
    pub name: String,
    pub template_id: Uuid,
    /// Explicit recipients; when empty, every subscribed contact is used.
    pub contact_ids: Vec<Uuid>,
    pub scheduled_at: Option<OffsetDateTime>,
}

/// Acknowledgment returned once a send request has been accepted and queued.
#[derive(Debug, Clone, Serialize)]
pub struct SendAccepted {
    pub campaign_id: Uuid,
    pub recipient_count: i32,
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignAnalytics {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub total_recipients: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub failed_count: i32,
    pub open_rate: f64,
    pub click_rate: f64,
    pub delivery_rate: f64,
}

/// Percentage of `count` over `sent`, rounded to two decimals. A campaign
/// with zero sends reports 0.00 rather than dividing by zero.
pub(crate) fn rate_percent(count: i32, sent: i32) -> f64 {
    let denominator = sent.max(1) as f64;
    let percent = count as f64 / denominator * 100.0;
    (percent * 100.0).round() / 100.0
}

pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), CampaignError> {
    if value.trim().is_empty() {
        return Err(CampaignError::ConstraintViolation(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_with_zero_sends_is_zero() {
        assert_eq!(rate_percent(0, 0), 0.0);
    }

    #[test]
    fn rate_rounds_to_two_decimals() {
        assert_eq!(rate_percent(10, 50), 20.00);
        assert_eq!(rate_percent(1, 3), 33.33);
        assert_eq!(rate_percent(2, 3), 66.67);
    }

    #[test]
    fn rate_counts_against_floor_of_one() {
        // Opens recorded against a campaign that never sent still report a
        // bounded percentage instead of a division error.
        assert_eq!(rate_percent(5, 0), 500.0);
    }
}
