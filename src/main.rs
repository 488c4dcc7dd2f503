use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use postino::{
    application::{
        campaigns::CampaignService,
        contacts::ContactService,
        dashboard::DashboardService,
        delivery::{DeliveryClient, SmtpClientConfig, SmtpDeliveryClient},
        error::AppError,
        jobs::{
            JobWorkerContext, RecoverySweepContext, SEND_CAMPAIGN_QUEUE, SendCampaignJobPayload,
            SendJobQueue, process_recovery_sweep_job, process_send_campaign_job,
            recovery_sweep_schedule,
        },
        repos::{CampaignsRepo, ContactsRepo, EmailsRepo, TemplatesRepo},
        templates::TemplateService,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{ApiState, build_api_router},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let app = build_application_context(
        http_repositories.clone(),
        job_repositories.clone(),
        &settings,
    )?;

    let monitor_handle = spawn_job_monitor(
        job_repositories,
        app.job_context.clone(),
        app.recovery_context.clone(),
        &settings.jobs,
    );

    let result = serve_http(&settings, app.api_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

struct ApplicationContext {
    api_state: ApiState,
    job_context: JobWorkerContext,
    recovery_context: RecoverySweepContext,
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresStorage::setup(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn build_application_context(
    http_repositories: Arc<PostgresRepositories>,
    job_repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let campaigns_repo: Arc<dyn CampaignsRepo> = http_repositories.clone();
    let emails_repo: Arc<dyn EmailsRepo> = http_repositories.clone();
    let templates_repo: Arc<dyn TemplatesRepo> = http_repositories.clone();
    let contacts_repo: Arc<dyn ContactsRepo> = http_repositories.clone();

    let delivery: Arc<dyn DeliveryClient> = Arc::new(
        SmtpDeliveryClient::new(smtp_client_config(settings)?)
            .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?,
    );

    let queue: Arc<dyn SendJobQueue> = http_repositories.clone();

    let campaign_service = Arc::new(CampaignService::new(
        campaigns_repo.clone(),
        emails_repo.clone(),
        templates_repo.clone(),
        contacts_repo.clone(),
        queue,
    ));
    let contact_service = Arc::new(ContactService::new(contacts_repo.clone()));
    let template_service = Arc::new(TemplateService::new(templates_repo.clone()));
    let dashboard_service = Arc::new(DashboardService::new(
        contacts_repo.clone(),
        campaigns_repo.clone(),
    ));

    let api_state = ApiState {
        campaigns: campaign_service,
        contacts: contact_service,
        templates: template_service,
        dashboard: dashboard_service,
        db: http_repositories,
    };

    let job_campaigns_repo: Arc<dyn CampaignsRepo> = job_repositories.clone();
    let job_emails_repo: Arc<dyn EmailsRepo> = job_repositories.clone();

    let job_context = JobWorkerContext {
        campaigns: job_campaigns_repo.clone(),
        emails: job_emails_repo,
        delivery,
        dispatch_limit: settings.jobs.dispatch_limit.get() as usize,
    };

    let recovery_context = RecoverySweepContext {
        campaigns: job_campaigns_repo,
        stuck_after: settings.recovery.stuck_after,
    };

    Ok(ApplicationContext {
        api_state,
        job_context,
        recovery_context,
    })
}

fn smtp_client_config(settings: &config::Settings) -> Result<SmtpClientConfig, AppError> {
    let smtp = &settings.smtp;

    let host = require_smtp(smtp.host.as_ref(), "smtp.host")?;
    let username = require_smtp(smtp.username.as_ref(), "smtp.username")?;
    let password = require_smtp(smtp.password.as_ref(), "smtp.password")?;
    let from_email = require_smtp(smtp.from_email.as_ref(), "smtp.from_email")?;

    Ok(SmtpClientConfig {
        host,
        port: smtp.port,
        username,
        password,
        from_email,
        from_name: smtp.from_name.clone(),
        starttls: smtp.starttls,
        timeout: smtp.timeout,
    })
}

fn require_smtp(value: Option<&String>, key: &'static str) -> Result<String, AppError> {
    value.cloned().ok_or_else(|| {
        AppError::from(InfraError::configuration(format!("{key} is not configured")))
    })
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    context: JobWorkerContext,
    recovery_context: RecoverySweepContext,
    jobs: &config::JobsSettings,
) -> tokio::task::JoinHandle<()> {
    let send_storage: PostgresStorage<SendCampaignJobPayload> = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(SEND_CAMPAIGN_QUEUE),
    );

    let send_concurrency = jobs.send_concurrency.get() as usize;

    let send_worker = WorkerBuilder::new("send-campaign-worker")
        .concurrency(send_concurrency)
        .data(context)
        .backend(send_storage)
        .build_fn(process_send_campaign_job);

    let recovery_worker = WorkerBuilder::new("recovery-sweep-worker")
        .data(recovery_context)
        .backend(CronStream::new(recovery_sweep_schedule()))
        .build_fn(process_recovery_sweep_job);

    let monitor = Monitor::new().register(send_worker).register(recovery_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let router = build_api_router(api_state);

    let listener = tokio::net::TcpListener::bind(settings.server.listen_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "postino::serve",
        addr = %settings.server.listen_addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
