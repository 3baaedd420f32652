use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use provisiond::capabilities::{CapabilityRegistry, CoreCapability, SupportCapability};
use provisiond::config::{DaemonConfig, Overrides};
use provisiond::host::probe::HttpInstanceProbe;
use provisiond::host::smtp::SmtpMailTransport;
use provisiond::host::store::JsonConfigStore;
use provisiond::host::users::JsonUserDirectory;
use provisiond::host::{AppConfigStore, MailTransport, SystemConfigStore, UserDirectory};
use provisiond::jobs::post_setup::{JobStatus, PostSetupJob, STATUS_KEY};
use provisiond::jobs::{InProcessJobList, JobList};
use provisiond::listener::{EventBus, InstallEvent, InstallationListener};
use provisiond::mail::WelcomeMailHelper;
use provisiond::secrets::AdminSecrets;
use provisiond::{rest, AppContext, APP_ID};

#[derive(Parser)]
#[command(
    name = "provisiond",
    about = "Post-install provisioning daemon — secrets provisioning and welcome-mail bootstrap",
    version
)]
struct Args {
    /// Data directory for persisted state and config.toml
    #[arg(long, env = "PROVISIOND_DATA_DIR", default_value = "/var/lib/provisiond")]
    data_dir: PathBuf,

    /// REST API port
    #[arg(long, env = "PROVISIOND_PORT")]
    port: Option<u16>,

    /// Bind address for the REST API (default: 127.0.0.1)
    #[arg(long, env = "PROVISIOND_BIND")]
    bind_address: Option<String>,

    /// Post-setup poll interval in seconds (default: 2)
    #[arg(long, env = "PROVISIOND_POLL_INTERVAL")]
    poll_interval_secs: Option<u64>,

    /// Path probed on the public URL to decide readiness (default: /status.php)
    #[arg(long, env = "PROVISIOND_PROBE_PATH")]
    probe_path: Option<String>,

    /// Admin secrets file (default: /vault/secrets/adminconfig)
    #[arg(long, env = "PROVISIOND_ADMIN_SECRETS")]
    admin_secrets_path: Option<PathBuf>,

    /// SMTP secrets file (default: /vault/secrets/smtpconfig)
    #[arg(long, env = "PROVISIOND_SMTP_SECRETS")]
    smtp_secrets_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROVISIOND_LOG")]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data dir {}", args.data_dir.display()))?;

    let config = Arc::new(DaemonConfig::load(
        args.data_dir.clone(),
        Overrides {
            port: args.port,
            bind_address: args.bind_address,
            poll_interval_secs: args.poll_interval_secs,
            probe_path: args.probe_path,
            admin_secrets_path: args.admin_secrets_path,
            smtp_secrets_path: args.smtp_secrets_path,
            log: args.log,
        },
    ));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "starting provisiond"
    );

    let store = Arc::new(
        JsonConfigStore::open(config.data_dir.join("state.json"))
            .await
            .context("failed to open the config store")?,
    );
    let app_config: Arc<dyn AppConfigStore> = store.clone();
    let system_config: Arc<dyn SystemConfigStore> = store;
    let users: Arc<dyn UserDirectory> =
        Arc::new(JsonUserDirectory::new(config.data_dir.join("users.json")));
    let job_list: Arc<dyn JobList> = Arc::new(InProcessJobList::new(config.poll_interval));

    let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailTransport::new(system_config.clone()));
    let mail = Arc::new(WelcomeMailHelper::new(
        transport,
        app_config.clone(),
        system_config.clone(),
        config.secret.clone(),
    ));
    let post_setup = Arc::new(PostSetupJob::new(
        app_config.clone(),
        system_config.clone(),
        users.clone(),
        Arc::new(HttpInstanceProbe::new()),
        job_list.clone(),
        mail,
        config.probe_path.clone(),
    ));

    let listener = Arc::new(InstallationListener::new(
        app_config.clone(),
        system_config.clone(),
        job_list.clone(),
        post_setup.clone(),
        config.admin_secrets_path.clone(),
        config.smtp_secrets_path.clone(),
    ));

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let event_listener = listener.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            event_listener.handle(event).await;
        }
    });

    dispatch_startup_state(&config, &app_config, &job_list, &post_setup, &bus).await;

    let mut capabilities = CapabilityRegistry::new();
    capabilities.register(Arc::new(CoreCapability));
    // Registered last so it overrides any other capability report.
    capabilities.register(Arc::new(SupportCapability));

    let ctx = Arc::new(AppContext {
        config: config.clone(),
        app_config,
        system_config,
        users,
        job_list,
        capabilities: Arc::new(capabilities),
    });

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .context("invalid bind address")?;
    rest::start_rest_server(ctx, addr).await
}

/// Decide what to do with the persisted post-install flag at startup.
///
/// `UNKNOWN` means this is the first start after installation, so the
/// installation-completed event fires now. `INIT` means a previous run was
/// interrupted before the welcome mail went out; the poll job is re-scheduled
/// with the admin user re-resolved from the secrets file.
async fn dispatch_startup_state(
    config: &DaemonConfig,
    app_config: &Arc<dyn AppConfigStore>,
    job_list: &Arc<dyn JobList>,
    post_setup: &Arc<PostSetupJob>,
    bus: &EventBus,
) {
    let raw = app_config
        .get_string(APP_ID, STATUS_KEY, JobStatus::Unknown.as_str())
        .await;
    match JobStatus::parse(&raw) {
        JobStatus::Unknown => {
            info!("first start after installation, running post-install provisioning");
            bus.emit(InstallEvent::InstallationCompleted { admin_user: None });
        }
        JobStatus::Init => {
            info!("post-install provisioning was interrupted, resuming the welcome mail job");
            match AdminSecrets::load(&config.admin_secrets_path) {
                Ok(secrets) => {
                    job_list
                        .add(post_setup.clone(), &secrets.admin_user)
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "could not resolve the install admin user, welcome mail will not be sent");
                }
            }
        }
        JobStatus::Done => {
            debug!("post-install provisioning already complete");
        }
    }
}
