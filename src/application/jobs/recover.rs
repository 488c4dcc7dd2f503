//! Cron sweep recovering campaigns stranded mid-send.
//!
//! A crash during the dispatch phase leaves a campaign in `sending` with no
//! worker attached. The sweep resets such campaigns (and their in-flight
//! emails) once `started_at` is older than the configured bound, after which
//! a fresh send request is accepted again and the pending-only snapshot
//! keeps already-delivered emails untouched.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use apalis_cron::Schedule;
use metrics::counter;
use time::OffsetDateTime;

use crate::application::repos::CampaignsRepo;

/// Marker struct for the cron-triggered sweep.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron
/// compatibility.
#[derive(Default, Debug, Clone)]
pub struct RecoverySweepJob;

impl From<chrono::DateTime<chrono::Utc>> for RecoverySweepJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct RecoverySweepContext {
    pub campaigns: Arc<dyn CampaignsRepo>,
    /// How long a campaign may sit in `sending` before it counts as stuck.
    pub stuck_after: Duration,
}

pub async fn process_recovery_sweep_job(
    _job: RecoverySweepJob,
    ctx: Data<RecoverySweepContext>,
) -> Result<(), apalis::prelude::Error> {
    let stuck_before = OffsetDateTime::now_utc() - ctx.stuck_after;

    match ctx.campaigns.reset_stuck_campaigns(stuck_before).await {
        Ok(reset) if !reset.is_empty() => {
            counter!("postino_campaigns_recovered_total").increment(reset.len() as u64);
            tracing::info!(
                recovered = reset.len(),
                campaign_ids = ?reset,
                "reset stuck campaigns"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "recovery sweep failed");
        }
        _ => {}
    }

    Ok(())
}

/// Sweep cadence: every five minutes.
pub fn recovery_sweep_schedule() -> Schedule {
    Schedule::from_str("0 */5 * * * *").expect("Invalid cron expression for recovery sweep")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_correctly() {
        let schedule = recovery_sweep_schedule();
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}
