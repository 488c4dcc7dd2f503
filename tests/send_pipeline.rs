//! End-to-end exercises of the send pipeline over in-memory fakes: the
//! lifecycle guard, the snapshot/dispatch/reconcile procedure, and the
//! invariants the persisted counters must keep across repeated runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use postino::application::campaigns::{CampaignError, CampaignService, CreateCampaignCommand};
use postino::application::delivery::{DeliveryClient, DeliveryError, OutboundMessage};
use postino::application::jobs::{
    JobWorkerContext, SendCampaignJobPayload, SendJobQueue, SendRunSummary, run_send_procedure,
};
use postino::application::repos::{
    CampaignsRepo, ContactsRepo, CreateCampaignParams, CreateContactParams, CreateTemplateParams,
    EmailDisposition, EmailsRepo, NewEmailParams, RepoError, RunTally, TemplatesRepo,
    UpdateContactParams, UpdateTemplateParams,
};
use postino::domain::entities::{CampaignRecord, ContactRecord, EmailRecord, TemplateRecord};
use postino::domain::types::{CampaignStatus, EmailEventType, EmailStatus};

#[derive(Default)]
struct InMemoryStore {
    contacts: Mutex<Vec<ContactRecord>>,
    templates: Mutex<Vec<TemplateRecord>>,
    campaigns: Mutex<HashMap<Uuid, CampaignRecord>>,
    emails: Mutex<HashMap<Uuid, EmailRecord>>,
    events: Mutex<Vec<(Uuid, EmailEventType)>>,
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[async_trait]
impl ContactsRepo for InMemoryStore {
    async fn create_contact(
        &self,
        params: CreateContactParams,
    ) -> Result<ContactRecord, RepoError> {
        let record = ContactRecord {
            id: Uuid::new_v4(),
            owner_id: params.owner_id,
            email: params.email,
            first_name: params.first_name,
            last_name: params.last_name,
            company: params.company,
            custom_fields: params.custom_fields,
            subscribed: params.subscribed,
            created_at: now(),
            updated_at: now(),
        };
        self.contacts.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_contact(
        &self,
        _params: UpdateContactParams,
    ) -> Result<ContactRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn delete_contact(&self, _owner_id: Uuid, _id: Uuid) -> Result<(), RepoError> {
        Ok(())
    }

    async fn find_contact(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ContactRecord>, RepoError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .find(|contact| contact.owner_id == owner_id && contact.id == id)
            .cloned())
    }

    async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRecord>, RepoError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|contact| contact.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_contacts_by_ids(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ContactRecord>, RepoError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|contact| contact.owner_id == owner_id && ids.contains(&contact.id))
            .cloned()
            .collect())
    }

    async fn list_subscribed_contacts(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ContactRecord>, RepoError> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .filter(|contact| contact.owner_id == owner_id && contact.subscribed)
            .cloned()
            .collect())
    }

    async fn count_contacts(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        Ok(self.list_contacts(owner_id).await?.len() as u64)
    }
}

#[async_trait]
impl TemplatesRepo for InMemoryStore {
    async fn create_template(
        &self,
        params: CreateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        let record = TemplateRecord {
            id: Uuid::new_v4(),
            owner_id: params.owner_id,
            name: params.name,
            subject: params.subject,
            body: params.body,
            created_at: now(),
            updated_at: now(),
        };
        self.templates.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_template(
        &self,
        _params: UpdateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn delete_template(&self, _owner_id: Uuid, _id: Uuid) -> Result<(), RepoError> {
        Ok(())
    }

    async fn find_template(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TemplateRecord>, RepoError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|template| template.owner_id == owner_id && template.id == id)
            .cloned())
    }

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<TemplateRecord>, RepoError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .filter(|template| template.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CampaignsRepo for InMemoryStore {
    async fn create_campaign(
        &self,
        params: CreateCampaignParams,
    ) -> Result<CampaignRecord, RepoError> {
        let record = CampaignRecord {
            id: Uuid::new_v4(),
            owner_id: params.owner_id,
            template_id: params.template_id,
            name: params.name,
            status: params.status,
            recipient_count: params.recipient_count,
            sent_count: 0,
            delivered_count: 0,
            opened_count: 0,
            clicked_count: 0,
            failed_count: 0,
            scheduled_at: params.scheduled_at,
            started_at: None,
            completed_at: None,
            created_at: now(),
            updated_at: now(),
        };
        self.campaigns
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_campaign(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CampaignRecord>, RepoError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .get(&id)
            .filter(|campaign| campaign.owner_id == owner_id)
            .cloned())
    }

    async fn list_campaigns(&self, owner_id: Uuid) -> Result<Vec<CampaignRecord>, RepoError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .values()
            .filter(|campaign| campaign.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn begin_sending(
        &self,
        owner_id: Uuid,
        id: Uuid,
        started_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        match campaigns.get_mut(&id) {
            Some(campaign)
                if campaign.owner_id == owner_id && campaign.status.accepts_send() =>
            {
                campaign.status = CampaignStatus::Sending;
                campaign.started_at = Some(started_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reconcile_run(
        &self,
        campaign_id: Uuid,
        outcomes: &[EmailDisposition],
        completed_at: OffsetDateTime,
    ) -> Result<RunTally, RepoError> {
        let mut tally = RunTally::default();
        {
            let mut emails = self.emails.lock().unwrap();
            for outcome in outcomes {
                let Some(email) = emails.get_mut(&outcome.email_id) else {
                    continue;
                };
                if email.campaign_id != campaign_id || email.status != EmailStatus::Sending {
                    continue;
                }
                if outcome.delivered {
                    email.status = EmailStatus::Sent;
                    email.sent_at = Some(completed_at);
                    email.error_message = None;
                    self.events
                        .lock()
                        .unwrap()
                        .push((email.id, EmailEventType::Sent));
                    tally.sent += 1;
                } else {
                    email.status = EmailStatus::Failed;
                    email.error_message = Some(
                        outcome
                            .failure_cause
                            .clone()
                            .unwrap_or_else(|| "delivery failed".to_string()),
                    );
                    tally.failed += 1;
                }
            }
        }

        let mut campaigns = self.campaigns.lock().unwrap();
        if let Some(campaign) = campaigns.get_mut(&campaign_id) {
            campaign.sent_count += tally.sent;
            campaign.failed_count += tally.failed;
            campaign.status = CampaignStatus::Completed;
            campaign.completed_at = Some(completed_at);
        }

        Ok(tally)
    }

    async fn reset_stuck_campaigns(
        &self,
        stuck_before: OffsetDateTime,
    ) -> Result<Vec<Uuid>, RepoError> {
        let mut reset = Vec::new();
        let mut campaigns = self.campaigns.lock().unwrap();
        for campaign in campaigns.values_mut() {
            if campaign.status == CampaignStatus::Sending
                && campaign.started_at.is_some_and(|at| at < stuck_before)
            {
                campaign.status = CampaignStatus::Draft;
                campaign.started_at = None;
                reset.push(campaign.id);
            }
        }

        let mut emails = self.emails.lock().unwrap();
        for email in emails.values_mut() {
            if reset.contains(&email.campaign_id) && email.status == EmailStatus::Sending {
                email.status = EmailStatus::Pending;
            }
        }

        Ok(reset)
    }

    async fn delete_campaign(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        let removable = campaigns.get(&id).is_some_and(|campaign| {
            campaign.owner_id == owner_id && campaign.status != CampaignStatus::Sending
        });
        if !removable {
            return Err(RepoError::NotFound);
        }
        campaigns.remove(&id);
        Ok(())
    }

    async fn count_campaigns(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        Ok(self.list_campaigns(owner_id).await?.len() as u64)
    }

    async fn total_sent(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .list_campaigns(owner_id)
            .await?
            .iter()
            .map(|campaign| campaign.sent_count as u64)
            .sum())
    }

    async fn list_recent_campaigns(
        &self,
        owner_id: Uuid,
        limit: u32,
    ) -> Result<Vec<CampaignRecord>, RepoError> {
        let mut campaigns = self.list_campaigns(owner_id).await?;
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns.truncate(limit as usize);
        Ok(campaigns)
    }
}

#[async_trait]
impl EmailsRepo for InMemoryStore {
    async fn insert_emails(&self, rows: &[NewEmailParams]) -> Result<u64, RepoError> {
        let mut emails = self.emails.lock().unwrap();
        for row in rows {
            let record = EmailRecord {
                id: Uuid::new_v4(),
                campaign_id: row.campaign_id,
                recipient_email: row.recipient_email.clone(),
                recipient_name: row.recipient_name.clone(),
                subject: row.subject.clone(),
                body: row.body.clone(),
                status: row.status,
                error_message: None,
                sent_at: None,
                delivered_at: None,
                opened_at: None,
                clicked_at: None,
                created_at: now(),
                updated_at: now(),
            };
            emails.insert(record.id, record);
        }
        Ok(rows.len() as u64)
    }

    async fn snapshot_pending(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError> {
        let mut emails = self.emails.lock().unwrap();
        let mut snapshot = Vec::new();
        for email in emails.values_mut() {
            if email.campaign_id == campaign_id && email.status == EmailStatus::Pending {
                email.status = EmailStatus::Sending;
                snapshot.push(email.clone());
            }
        }
        Ok(snapshot)
    }

    async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<EmailRecord>, RepoError> {
        Ok(self
            .emails
            .lock()
            .unwrap()
            .values()
            .filter(|email| email.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

struct FakeDeliveryClient {
    fail_for: Vec<String>,
}

#[async_trait]
impl DeliveryClient for FakeDeliveryClient {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        if self.fail_for.contains(&message.recipient_email) {
            Err(DeliveryError::Connect("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingQueue {
    enqueued: Mutex<Vec<SendCampaignJobPayload>>,
}

#[async_trait]
impl SendJobQueue for RecordingQueue {
    async fn enqueue(&self, payload: SendCampaignJobPayload) -> Result<String, RepoError> {
        let mut enqueued = self.enqueued.lock().unwrap();
        enqueued.push(payload);
        Ok(format!("job-{}", enqueued.len()))
    }
}

struct Harness {
    owner_id: Uuid,
    store: Arc<InMemoryStore>,
    queue: Arc<RecordingQueue>,
    service: CampaignService,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let service = CampaignService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            queue.clone(),
        );

        Self {
            owner_id: Uuid::new_v4(),
            store,
            queue,
            service,
        }
    }

    fn context(&self, fail_for: Vec<String>) -> JobWorkerContext {
        JobWorkerContext {
            campaigns: self.store.clone(),
            emails: self.store.clone(),
            delivery: Arc::new(FakeDeliveryClient { fail_for }),
            dispatch_limit: 5,
        }
    }

    async fn seed_campaign(&self, recipients: &[(&str, &str)]) -> CampaignRecord {
        let template = self
            .store
            .create_template(CreateTemplateParams {
                owner_id: self.owner_id,
                name: "welcome".to_string(),
                subject: "Hi {{name}}".to_string(),
                body: "<p>Hello {{name}}, this is for {{email}}.</p>".to_string(),
            })
            .await
            .expect("template");

        for (name, email) in recipients {
            self.store
                .create_contact(CreateContactParams {
                    owner_id: self.owner_id,
                    email: email.to_string(),
                    first_name: Some(name.to_string()),
                    last_name: None,
                    company: None,
                    custom_fields: serde_json::json!({}),
                    subscribed: true,
                })
                .await
                .expect("contact");
        }

        self.service
            .create_campaign(
                self.owner_id,
                CreateCampaignCommand {
                    name: "launch".to_string(),
                    template_id: template.id,
                    contact_ids: Vec::new(),
                    scheduled_at: None,
                },
            )
            .await
            .expect("campaign")
    }
}

const RECIPIENTS: [(&str, &str); 3] = [
    ("Ada", "ada@example.com"),
    ("Grace", "grace@example.com"),
    ("Joan", "joan@example.com"),
];

#[tokio::test]
async fn successful_run_completes_campaign_and_marks_every_email_sent() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;
    assert_eq!(campaign.status, CampaignStatus::Draft);
    assert_eq!(campaign.recipient_count, 3);

    let accepted = harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("send accepted");
    assert_eq!(accepted.recipient_count, 3);
    assert_eq!(harness.queue.enqueued.lock().unwrap().len(), 1);

    let summary = run_send_procedure(&harness.context(Vec::new()), harness.owner_id, campaign.id)
        .await
        .expect("run");
    assert!(matches!(
        summary,
        SendRunSummary::Completed(RunTally { sent: 3, failed: 0 })
    ));

    let campaign = harness
        .service
        .get_campaign(harness.owner_id, campaign.id)
        .await
        .expect("campaign");
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 3);
    assert_eq!(campaign.failed_count, 0);
    assert!(campaign.completed_at.is_some());

    let emails = harness
        .service
        .list_emails(harness.owner_id, campaign.id)
        .await
        .expect("emails");
    assert_eq!(emails.len(), 3);
    for email in &emails {
        assert_eq!(email.status, EmailStatus::Sent);
        assert!(email.sent_at.is_some());
        assert!(email.error_message.is_none());
    }

    let events = harness.store.events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|(_, kind)| *kind == EmailEventType::Sent));
}

#[tokio::test]
async fn partial_failure_still_completes_with_cause_recorded() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;

    harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("send accepted");

    let context = harness.context(vec!["grace@example.com".to_string()]);
    let summary = run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("run");
    assert!(matches!(
        summary,
        SendRunSummary::Completed(RunTally { sent: 2, failed: 1 })
    ));

    let campaign = harness
        .service
        .get_campaign(harness.owner_id, campaign.id)
        .await
        .expect("campaign");
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 2);
    assert_eq!(campaign.failed_count, 1);

    let emails = harness
        .service
        .list_emails(harness.owner_id, campaign.id)
        .await
        .expect("emails");
    let failed: Vec<_> = emails
        .iter()
        .filter(|email| email.status == EmailStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].recipient_email, "grace@example.com");
    assert!(
        failed[0]
            .error_message
            .as_deref()
            .is_some_and(|cause| cause.contains("connection refused"))
    );
}

#[tokio::test]
async fn duplicate_send_requests_are_rejected_without_touching_emails() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;

    harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("first send accepted");

    let rejected = harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect_err("second send while sending");
    assert!(matches!(
        rejected,
        CampaignError::StatusConflict(CampaignStatus::Sending)
    ));

    // The guard rejection must leave the work set untouched.
    let emails = harness
        .service
        .list_emails(harness.owner_id, campaign.id)
        .await
        .expect("emails");
    assert!(
        emails
            .iter()
            .all(|email| email.status == EmailStatus::Pending)
    );
    assert_eq!(harness.queue.enqueued.lock().unwrap().len(), 1);

    run_send_procedure(&harness.context(Vec::new()), harness.owner_id, campaign.id)
        .await
        .expect("run");

    let rejected = harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect_err("send after completion");
    assert!(matches!(
        rejected,
        CampaignError::StatusConflict(CampaignStatus::Completed)
    ));
}

#[tokio::test]
async fn rerunning_the_procedure_excludes_settled_emails() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;

    harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("send accepted");

    let context = harness.context(Vec::new());
    run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("first run");

    // A second pass finds no pending emails and must not double-count.
    let summary = run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("second run");
    assert!(matches!(
        summary,
        SendRunSummary::Completed(RunTally { sent: 0, failed: 0 })
    ));

    let campaign = harness
        .service
        .get_campaign(harness.owner_id, campaign.id)
        .await
        .expect("campaign");
    assert_eq!(campaign.sent_count, 3);
    assert_eq!(campaign.failed_count, 0);

    let events = harness.store.events.lock().unwrap();
    assert_eq!(events.len(), 3, "no duplicate sent events");
}

#[tokio::test]
async fn counters_accumulate_additively_across_partial_runs() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;

    harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("send accepted");

    // First pass: one recipient refuses the connection.
    let context = harness.context(vec!["joan@example.com".to_string()]);
    run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("first run");

    // Operator resets the failed email for another attempt; the next run must
    // pick up only that one and add to the existing counters.
    {
        let mut emails = harness.store.emails.lock().unwrap();
        for email in emails.values_mut() {
            if email.status == EmailStatus::Failed {
                email.status = EmailStatus::Pending;
            }
        }
    }

    let context = harness.context(Vec::new());
    let summary = run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("second run");
    assert!(matches!(
        summary,
        SendRunSummary::Completed(RunTally { sent: 1, failed: 0 })
    ));

    let campaign = harness
        .service
        .get_campaign(harness.owner_id, campaign.id)
        .await
        .expect("campaign");
    assert_eq!(campaign.sent_count, 3);
    assert_eq!(campaign.failed_count, 1);
}

#[tokio::test]
async fn vanished_campaign_aborts_silently() {
    let harness = Harness::new();
    let context = harness.context(Vec::new());

    let summary = run_send_procedure(&context, harness.owner_id, Uuid::new_v4())
        .await
        .expect("run");
    assert_eq!(summary, SendRunSummary::CampaignGone);
    assert!(harness.store.emails.lock().unwrap().is_empty());
}

#[tokio::test]
async fn analytics_rates_follow_the_persisted_counters() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&RECIPIENTS).await;

    // Freshly created: nothing sent, no division error.
    let analytics = harness
        .service
        .analytics(harness.owner_id, campaign.id)
        .await
        .expect("analytics");
    assert_eq!(analytics.open_rate, 0.0);
    assert_eq!(analytics.click_rate, 0.0);
    assert_eq!(analytics.delivery_rate, 0.0);

    {
        let mut campaigns = harness.store.campaigns.lock().unwrap();
        let record = campaigns.get_mut(&campaign.id).expect("campaign");
        record.sent_count = 50;
        record.opened_count = 10;
        record.clicked_count = 5;
        record.delivered_count = 48;
    }

    let analytics = harness
        .service
        .analytics(harness.owner_id, campaign.id)
        .await
        .expect("analytics");
    assert_eq!(analytics.open_rate, 20.00);
    assert_eq!(analytics.click_rate, 10.00);
    assert_eq!(analytics.delivery_rate, 96.00);
}

#[tokio::test]
async fn rendering_personalizes_each_recipient() {
    let harness = Harness::new();
    let campaign = harness.seed_campaign(&[("Ada", "ada@example.com")]).await;

    harness
        .service
        .send_campaign(harness.owner_id, campaign.id)
        .await
        .expect("send accepted");

    // Capture what actually reaches the delivery client.
    struct CapturingClient {
        seen: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl DeliveryClient for CapturingClient {
        async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    let client = Arc::new(CapturingClient {
        seen: Mutex::new(Vec::new()),
    });
    let context = JobWorkerContext {
        campaigns: harness.store.clone(),
        emails: harness.store.clone(),
        delivery: client.clone(),
        dispatch_limit: 5,
    };

    run_send_procedure(&context, harness.owner_id, campaign.id)
        .await
        .expect("run");

    let seen = client.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].subject, "Hi Ada");
    assert_eq!(
        seen[0].body,
        "<p>Hello Ada, this is for ada@example.com.</p>"
    );
}
