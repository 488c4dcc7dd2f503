use std::sync::Arc;

use crate::application::campaigns::CampaignService;
use crate::application::contacts::ContactService;
use crate::application::dashboard::DashboardService;
use crate::application::templates::TemplateService;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub campaigns: Arc<CampaignService>,
    pub contacts: Arc<ContactService>,
    pub templates: Arc<TemplateService>,
    pub dashboard: Arc<DashboardService>,
    pub db: Arc<PostgresRepositories>,
}
