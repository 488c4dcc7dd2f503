use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::application::delivery::DeliveryClient;
use crate::application::repos::{CampaignsRepo, EmailsRepo};

/// Shared context passed to job workers so they can reach persistence and
/// the outbound delivery client.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub campaigns: Arc<dyn CampaignsRepo>,
    pub emails: Arc<dyn EmailsRepo>,
    pub delivery: Arc<dyn DeliveryClient>,
    /// Upper bound on concurrent delivery attempts within one dispatch.
    pub dispatch_limit: usize,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
