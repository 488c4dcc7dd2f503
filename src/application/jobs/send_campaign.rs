//! The campaign send procedure: snapshot, dispatch, reconcile.

use std::sync::Arc;
use std::time::Instant;

use apalis::prelude::{Data, Error as ApalisError};
use metrics::histogram;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::delivery::{DispatchMessage, OutboundMessage, dispatch};
use crate::application::repos::{EmailDisposition, RepoError, RunTally};
use crate::domain::render::{PlaceholderVars, render_message};

use super::context::{JobWorkerContext, job_failed};

/// Queue namespace for send jobs.
pub const SEND_CAMPAIGN_QUEUE: &str = "send_campaign";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCampaignJobPayload {
    pub campaign_id: Uuid,
    pub owner_id: Uuid,
}

/// What one run of the procedure did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRunSummary {
    /// The campaign vanished before the snapshot; nothing to reconcile.
    CampaignGone,
    /// The run completed and reconciled this tally.
    Completed(RunTally),
}

/// Worker entry point registered with the job monitor.
pub async fn process_send_campaign_job(
    payload: SendCampaignJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let summary = run_send_procedure(ctx, payload.owner_id, payload.campaign_id)
        .await
        .map_err(job_failed)?;

    match summary {
        SendRunSummary::CampaignGone => {}
        SendRunSummary::Completed(tally) => {
            info!(
                target = "application::jobs::process_send_campaign_job",
                campaign_id = %payload.campaign_id,
                sent = tally.sent,
                failed = tally.failed,
                "campaign send completed"
            );
        }
    }

    Ok(())
}

/// Run the three-phase send procedure for one campaign.
///
/// Phase transactions live inside the repository calls and commit before the
/// next phase begins; nothing holds a transaction across SMTP round trips.
/// Re-running the procedure is safe: the snapshot only picks up emails still
/// pending, so a prior partial run's work is not repeated.
pub async fn run_send_procedure(
    ctx: &JobWorkerContext,
    owner_id: Uuid,
    campaign_id: Uuid,
) -> Result<SendRunSummary, RepoError> {
    let started = Instant::now();

    // Snapshot phase: freeze the work set. A concurrently deleted campaign
    // aborts silently; there is no state left to reconcile.
    let Some(_campaign) = ctx.campaigns.find_campaign(owner_id, campaign_id).await? else {
        warn!(
            target = "application::jobs::run_send_procedure",
            campaign_id = %campaign_id,
            "campaign vanished before snapshot"
        );
        return Ok(SendRunSummary::CampaignGone);
    };
    let snapshot = ctx.emails.snapshot_pending(campaign_id).await?;

    // Dispatch phase: render per recipient and fan out under the limit. No
    // transaction is open here.
    let messages: Vec<DispatchMessage> = snapshot
        .iter()
        .map(|email| {
            let vars = PlaceholderVars::for_recipient(&email.recipient_name, &email.recipient_email);
            let rendered = render_message(&email.subject, &email.body, &vars);
            DispatchMessage {
                email_id: email.id,
                message: OutboundMessage {
                    recipient_email: email.recipient_email.clone(),
                    recipient_name: email.recipient_name.clone(),
                    subject: rendered.subject,
                    body: rendered.body,
                },
            }
        })
        .collect();

    let outcomes = dispatch(Arc::clone(&ctx.delivery), messages, ctx.dispatch_limit).await;

    // Reconcile phase: apply terminal states, bump the campaign counters
    // additively, and complete the campaign. Partial failures still complete;
    // a failed recipient is data, not a pipeline error.
    let dispositions: Vec<EmailDisposition> = outcomes
        .into_iter()
        .map(|outcome| EmailDisposition {
            email_id: outcome.email_id,
            delivered: outcome.delivered,
            failure_cause: outcome.failure_cause,
        })
        .collect();

    let tally = ctx
        .campaigns
        .reconcile_run(campaign_id, &dispositions, OffsetDateTime::now_utc())
        .await?;

    histogram!("postino_campaign_send_ms").record(started.elapsed().as_millis() as f64);

    Ok(SendRunSummary::Completed(tally))
}
