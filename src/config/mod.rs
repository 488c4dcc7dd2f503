//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "postino";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_FROM_NAME: &str = "Postino";
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SEND_WORKER_CONCURRENCY: u32 = 1;
const DEFAULT_DISPATCH_LIMIT: u32 = 5;
const DEFAULT_RECOVERY_STUCK_AFTER_SECS: u64 = 30 * 60;

/// Command-line arguments for the Postino binary.
#[derive(Debug, Parser)]
#[command(name = "postino", version, about = "Postino campaign server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "POSTINO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Postino HTTP service and job workers.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the SMTP relay host.
    #[arg(long = "smtp-host", value_name = "HOST")]
    pub smtp_host: Option<String>,

    /// Override the SMTP relay port.
    #[arg(long = "smtp-port", value_name = "PORT")]
    pub smtp_port: Option<u16>,

    /// Override the SMTP username.
    #[arg(long = "smtp-username", value_name = "USER")]
    pub smtp_username: Option<String>,

    /// Override the SMTP password.
    #[arg(long = "smtp-password", value_name = "PASSWORD")]
    pub smtp_password: Option<String>,

    /// Override the From address used on outbound mail.
    #[arg(long = "smtp-from-email", value_name = "ADDRESS")]
    pub smtp_from_email: Option<String>,

    /// Override the From display name used on outbound mail.
    #[arg(long = "smtp-from-name", value_name = "NAME")]
    pub smtp_from_name: Option<String>,

    /// Toggle STARTTLS; implicit TLS is used when disabled.
    #[arg(
        long = "smtp-starttls",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub smtp_starttls: Option<bool>,

    /// Override the per-attempt delivery timeout.
    #[arg(long = "smtp-timeout-seconds", value_name = "SECONDS")]
    pub smtp_timeout_seconds: Option<u64>,

    /// Override the send-campaign worker concurrency.
    #[arg(long = "jobs-send-concurrency", value_name = "COUNT")]
    pub jobs_send_concurrency: Option<u32>,

    /// Override the in-flight delivery limit within one campaign run.
    #[arg(long = "jobs-dispatch-limit", value_name = "COUNT")]
    pub jobs_dispatch_limit: Option<u32>,

    /// Override how long a campaign may sit in sending before recovery.
    #[arg(long = "recovery-stuck-after-seconds", value_name = "SECONDS")]
    pub recovery_stuck_after_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub smtp: SmtpSettings,
    pub jobs: JobsSettings,
    pub recovery: RecoverySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

/// Outbound SMTP endpoint configuration. Host, credentials, and From address
/// have no defaults; the serve path rejects a configuration missing them.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: Option<String>,
    pub from_name: String,
    pub starttls: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    /// How many send-campaign jobs may run at once.
    pub send_concurrency: NonZeroU32,
    /// In-flight delivery attempts within one campaign run.
    pub dispatch_limit: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub stuck_after: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("POSTINO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    smtp: RawSmtpSettings,
    jobs: RawJobsSettings,
    recovery: RawRecoverySettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSmtpSettings {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from_email: Option<String>,
    from_name: Option<String>,
    starttls: Option<bool>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    send_concurrency: Option<u32>,
    dispatch_limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRecoverySettings {
    stuck_after_seconds: Option<u64>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_http_max_connections {
            self.database.http_max_connections = Some(max);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(host) = overrides.smtp_host.as_ref() {
            self.smtp.host = Some(host.clone());
        }
        if let Some(port) = overrides.smtp_port {
            self.smtp.port = Some(port);
        }
        if let Some(username) = overrides.smtp_username.as_ref() {
            self.smtp.username = Some(username.clone());
        }
        if let Some(password) = overrides.smtp_password.as_ref() {
            self.smtp.password = Some(password.clone());
        }
        if let Some(from_email) = overrides.smtp_from_email.as_ref() {
            self.smtp.from_email = Some(from_email.clone());
        }
        if let Some(from_name) = overrides.smtp_from_name.as_ref() {
            self.smtp.from_name = Some(from_name.clone());
        }
        if let Some(starttls) = overrides.smtp_starttls {
            self.smtp.starttls = Some(starttls);
        }
        if let Some(timeout) = overrides.smtp_timeout_seconds {
            self.smtp.timeout_seconds = Some(timeout);
        }
        if let Some(value) = overrides.jobs_send_concurrency {
            self.jobs.send_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_dispatch_limit {
            self.jobs.dispatch_limit = Some(value);
        }
        if let Some(value) = overrides.recovery_stuck_after_seconds {
            self.recovery.stuck_after_seconds = Some(value);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            smtp,
            jobs,
            recovery,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let smtp = build_smtp_settings(smtp)?;
        let jobs = build_jobs_settings(jobs)?;
        let recovery = build_recovery_settings(recovery)?;

        Ok(Self {
            server,
            logging,
            database,
            smtp,
            jobs,
            recovery,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let listen_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.listen_addr", reason))?;

    Ok(ServerSettings { listen_addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let http_max_connections = non_zero(
        database
            .http_max_connections
            .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS),
        "database.http_max_connections",
    )?;
    let jobs_max_connections = non_zero(
        database
            .jobs_max_connections
            .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS),
        "database.jobs_max_connections",
    )?;

    Ok(DatabaseSettings {
        url: database.url,
        http_max_connections,
        jobs_max_connections,
    })
}

fn build_smtp_settings(smtp: RawSmtpSettings) -> Result<SmtpSettings, LoadError> {
    let port = smtp.port.unwrap_or(DEFAULT_SMTP_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "smtp.port",
            "port must be greater than zero",
        ));
    }

    let timeout_secs = smtp.timeout_seconds.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "smtp.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SmtpSettings {
        host: smtp.host,
        port,
        username: smtp.username,
        password: smtp.password,
        from_email: smtp.from_email,
        from_name: smtp
            .from_name
            .unwrap_or_else(|| DEFAULT_SMTP_FROM_NAME.to_string()),
        starttls: smtp.starttls.unwrap_or(true),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let send_concurrency = non_zero(
        jobs.send_concurrency
            .unwrap_or(DEFAULT_SEND_WORKER_CONCURRENCY),
        "jobs.send_concurrency",
    )?;
    let dispatch_limit = non_zero(
        jobs.dispatch_limit.unwrap_or(DEFAULT_DISPATCH_LIMIT),
        "jobs.dispatch_limit",
    )?;

    Ok(JobsSettings {
        send_concurrency,
        dispatch_limit,
    })
}

fn build_recovery_settings(recovery: RawRecoverySettings) -> Result<RecoverySettings, LoadError> {
    let stuck_after_secs = recovery
        .stuck_after_seconds
        .unwrap_or(DEFAULT_RECOVERY_STUCK_AFTER_SECS);
    if stuck_after_secs == 0 {
        return Err(LoadError::invalid(
            "recovery.stuck_after_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RecoverySettings {
        stuck_after: Duration::from_secs(stuck_after_secs),
    })
}

fn non_zero(value: u32, key: &'static str) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(overrides: ServeOverrides) -> CliArgs {
        CliArgs {
            config_file: None,
            command: Some(Command::Serve(Box::new(ServeArgs { overrides }))),
        }
    }

    #[test]
    fn defaults_resolve_without_any_source() {
        let settings = Settings::from_raw(RawSettings::default()).expect("settings");
        assert_eq!(settings.server.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(settings.smtp.port, DEFAULT_SMTP_PORT);
        assert!(settings.smtp.starttls);
        assert_eq!(settings.smtp.timeout, Duration::from_secs(15));
        assert_eq!(settings.jobs.dispatch_limit.get(), 5);
        assert_eq!(settings.recovery.stuck_after, Duration::from_secs(1800));
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let overrides = ServeOverrides {
            server_port: Some(8080),
            smtp_host: Some("mail.example.com".to_string()),
            jobs_dispatch_limit: Some(2),
            ..ServeOverrides::default()
        };

        let mut raw = RawSettings::default();
        raw.server.port = Some(3000);
        raw.smtp.host = Some("other.example.com".to_string());

        match cli_with(overrides).command {
            Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
            None => unreachable!(),
        }

        let settings = Settings::from_raw(raw).expect("settings");
        assert_eq!(settings.server.listen_addr.port(), 8080);
        assert_eq!(settings.smtp.host.as_deref(), Some("mail.example.com"));
        assert_eq!(settings.jobs.dispatch_limit.get(), 2);
    }

    #[test]
    fn zero_valued_limits_are_rejected() {
        let mut raw = RawSettings::default();
        raw.jobs.dispatch_limit = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key, .. }) if key == "jobs.dispatch_limit"
        ));

        let mut raw = RawSettings::default();
        raw.smtp.timeout_seconds = Some(0);
        assert!(Settings::from_raw(raw).is_err());
    }
}
