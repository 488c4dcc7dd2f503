mod context;
mod queue;
mod recover;
mod send_campaign;

pub use context::{JobWorkerContext, job_failed};
pub use queue::SendJobQueue;
pub use recover::{
    RecoverySweepContext, RecoverySweepJob, process_recovery_sweep_job, recovery_sweep_schedule,
};
pub use send_campaign::{
    SEND_CAMPAIGN_QUEUE, SendCampaignJobPayload, SendRunSummary, process_send_campaign_job,
    run_send_procedure,
};
