use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "postino_emails_sent_total",
            Unit::Count,
            "Total number of emails accepted by the upstream MTA."
        );
        describe_counter!(
            "postino_emails_failed_total",
            Unit::Count,
            "Total number of delivery attempts that failed."
        );
        describe_counter!(
            "postino_campaigns_recovered_total",
            Unit::Count,
            "Total number of stuck campaigns reset by the recovery sweep."
        );
        describe_gauge!(
            "postino_dispatch_inflight",
            Unit::Count,
            "Current number of delivery attempts in flight."
        );
        describe_histogram!(
            "postino_campaign_send_ms",
            Unit::Milliseconds,
            "Wall-clock latency of one campaign send run in milliseconds."
        );
    });
}
