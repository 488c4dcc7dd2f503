use std::sync::Arc;

use crate::application::jobs::SendJobQueue;
use crate::application::repos::{CampaignsRepo, ContactsRepo, EmailsRepo, TemplatesRepo};

#[derive(Clone)]
pub struct CampaignService {
    pub(crate) campaigns: Arc<dyn CampaignsRepo>,
    pub(crate) emails: Arc<dyn EmailsRepo>,
    pub(crate) templates: Arc<dyn TemplatesRepo>,
    pub(crate) contacts: Arc<dyn ContactsRepo>,
    pub(crate) queue: Arc<dyn SendJobQueue>,
}

impl CampaignService {
    pub fn new(
        campaigns: Arc<dyn CampaignsRepo>,
        emails: Arc<dyn EmailsRepo>,
        templates: Arc<dyn TemplatesRepo>,
        contacts: Arc<dyn ContactsRepo>,
        queue: Arc<dyn SendJobQueue>,
    ) -> Self {
        Self {
            campaigns,
            emails,
            templates,
            contacts,
            queue,
        }
    }
}
