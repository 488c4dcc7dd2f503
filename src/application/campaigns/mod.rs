mod commands;
mod queries;
mod service;
mod types;

pub use service::CampaignService;
pub use types::{
    CampaignAnalytics, CampaignError, CreateCampaignCommand, SendAccepted, ensure_non_empty,
};
