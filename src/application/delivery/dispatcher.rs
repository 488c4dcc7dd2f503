//! Bounded-concurrency fan-out of delivery attempts.

use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;
use uuid::Uuid;

use super::client::{DeliveryClient, OutboundMessage};

/// One unit of work: a rendered message correlated to its email row.
#[derive(Debug, Clone)]
pub struct DispatchMessage {
    pub email_id: Uuid,
    pub message: OutboundMessage,
}

/// Terminal result of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub email_id: Uuid,
    pub delivered: bool,
    pub failure_cause: Option<String>,
}

/// Send every message through the client with at most `limit` attempts in
/// flight. Exactly one outcome is produced per input; outcome order is
/// unspecified. A failed attempt never prevents the remaining messages from
/// being tried. Holds no state and performs no persistence.
pub async fn dispatch(
    client: Arc<dyn DeliveryClient>,
    messages: Vec<DispatchMessage>,
    limit: usize,
) -> Vec<DispatchOutcome> {
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut attempts = JoinSet::new();

    for unit in messages {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);

        attempts.spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(closed) => {
                    return DispatchOutcome {
                        email_id: unit.email_id,
                        delivered: false,
                        failure_cause: Some(closed.to_string()),
                    };
                }
            };

            gauge!("postino_dispatch_inflight").increment(1.0);
            let result = client.send(&unit.message).await;
            gauge!("postino_dispatch_inflight").decrement(1.0);
            drop(permit);

            match result {
                Ok(()) => {
                    counter!("postino_emails_sent_total").increment(1);
                    DispatchOutcome {
                        email_id: unit.email_id,
                        delivered: true,
                        failure_cause: None,
                    }
                }
                Err(err) => {
                    counter!("postino_emails_failed_total").increment(1);
                    DispatchOutcome {
                        email_id: unit.email_id,
                        delivered: false,
                        failure_cause: Some(err.cause()),
                    }
                }
            }
        });
    }

    let mut outcomes = Vec::with_capacity(attempts.len());
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                error!(
                    target = "application::delivery::dispatch",
                    error = %err,
                    "delivery attempt task aborted"
                );
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::application::delivery::DeliveryError;

    struct FakeClient {
        inflight: AtomicUsize,
        max_inflight: AtomicUsize,
        fail_for: Vec<String>,
    }

    impl FakeClient {
        fn new(fail_for: Vec<String>) -> Self {
            Self {
                inflight: AtomicUsize::new(0),
                max_inflight: AtomicUsize::new(0),
                fail_for,
            }
        }
    }

    #[async_trait]
    impl DeliveryClient for FakeClient {
        async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
            let current = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_inflight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inflight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_for.contains(&message.recipient_email) {
                Err(DeliveryError::Connect("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn batch(count: usize) -> Vec<DispatchMessage> {
        (0..count)
            .map(|index| DispatchMessage {
                email_id: Uuid::new_v4(),
                message: OutboundMessage {
                    recipient_email: format!("recipient-{index}@example.com"),
                    recipient_name: format!("Recipient {index}"),
                    subject: "Hello".to_string(),
                    body: "<p>Hello</p>".to_string(),
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn every_input_yields_exactly_one_outcome() {
        let client = Arc::new(FakeClient::new(Vec::new()));
        let messages = batch(12);
        let expected: Vec<Uuid> = messages.iter().map(|unit| unit.email_id).collect();

        let outcomes = dispatch(client, messages, 4).await;

        let mut seen: Vec<Uuid> = outcomes.iter().map(|outcome| outcome.email_id).collect();
        let mut expected = expected;
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        for limit in [1usize, 2, 5] {
            let client = Arc::new(FakeClient::new(Vec::new()));
            let observed = Arc::clone(&client);

            dispatch(client, batch(10), limit).await;

            assert!(
                observed.max_inflight.load(Ordering::SeqCst) <= limit,
                "limit {limit} exceeded"
            );
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let client = Arc::new(FakeClient::new(vec!["recipient-1@example.com".to_string()]));

        let outcomes = dispatch(client, batch(3), 5).await;

        assert_eq!(outcomes.len(), 3);
        let failed: Vec<_> = outcomes.iter().filter(|outcome| !outcome.delivered).collect();
        assert_eq!(failed.len(), 1);
        assert!(
            failed[0]
                .failure_cause
                .as_deref()
                .is_some_and(|cause| cause.contains("connection refused"))
        );
        assert_eq!(outcomes.iter().filter(|outcome| outcome.delivered).count(), 2);
    }
}
