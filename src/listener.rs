//! Installation-completed event handling.
//!
//! Events are a tagged enum, so the listener's signature statically guarantees
//! the payload shape — no runtime type checks at the dispatch boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::host::{AppConfigStore, SystemConfigStore};
use crate::jobs::post_setup::{JobStatus, PostSetupJob, STATUS_KEY};
use crate::jobs::JobList;
use crate::secrets::{AdminSecrets, SmtpSecrets};
use crate::APP_ID;

/// Events delivered by the host's installation flow.
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// The installation has completed. The admin username may ride along in
    /// the payload; otherwise it is read from the admin secrets file.
    InstallationCompleted { admin_user: Option<String> },
}

/// Broadcasts install events to registered listeners.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InstallEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Emit an event. No subscribers is fine.
    pub fn emit(&self, event: InstallEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstallEvent> {
        self.tx.subscribe()
    }
}

/// Reacts to the one-time installation-completed event: records the `INIT`
/// status flag, resolves the admin user, provisions the outgoing-mail system
/// settings, and schedules the post-setup job.
pub struct InstallationListener {
    app_config: Arc<dyn AppConfigStore>,
    system_config: Arc<dyn SystemConfigStore>,
    job_list: Arc<dyn JobList>,
    post_setup: Arc<PostSetupJob>,
    admin_secrets_path: PathBuf,
    smtp_secrets_path: PathBuf,
}

impl InstallationListener {
    pub fn new(
        app_config: Arc<dyn AppConfigStore>,
        system_config: Arc<dyn SystemConfigStore>,
        job_list: Arc<dyn JobList>,
        post_setup: Arc<PostSetupJob>,
        admin_secrets_path: impl Into<PathBuf>,
        smtp_secrets_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_config,
            system_config,
            job_list,
            post_setup,
            admin_secrets_path: admin_secrets_path.into(),
            smtp_secrets_path: smtp_secrets_path.into(),
        }
    }

    /// Handle an install event. Effects happen in order with no rollback on
    /// partial failure; nothing here may take the host down.
    pub async fn handle(&self, event: InstallEvent) {
        let InstallEvent::InstallationCompleted { admin_user } = event;

        if let Err(e) = self
            .app_config
            .set_string(APP_ID, STATUS_KEY, JobStatus::Init.as_str())
            .await
        {
            error!(error = %e, "failed to record post-install status");
        }

        debug!("post setup: resolving admin user");
        let admin_uid = match admin_user.filter(|u| !u.is_empty()) {
            Some(uid) => uid,
            None => match AdminSecrets::load(&self.admin_secrets_path) {
                Ok(secrets) => secrets.admin_user,
                Err(e) => {
                    error!(error = %e, "could not resolve the install admin user, welcome mail will not be sent");
                    return;
                }
            },
        };
        debug!(uid = %admin_uid, "post setup: admin user resolved");

        debug!("post setup: provisioning outgoing mail settings");
        if let Err(e) = self.provision_smtp().await {
            // The welcome mail may still go out if mail was configured by
            // other means, so the job is scheduled regardless.
            error!(error = %e, "failed to provision outgoing mail settings");
        } else {
            debug!("post setup: outgoing mail settings configured");
        }

        debug!("post setup: scheduling welcome mail job");
        self.job_list
            .add(self.post_setup.clone(), &admin_uid)
            .await;
        debug!("post setup: job scheduled");
    }

    /// One-shot write-through of the SMTP secrets into the host mail
    /// configuration. No retry: a malformed secrets file surfaces here.
    async fn provision_smtp(&self) -> anyhow::Result<()> {
        let smtp = SmtpSecrets::load(&self.smtp_secrets_path)?;
        let values = HashMap::from([
            ("mail_smtpmode".to_string(), "smtp".to_string()),
            ("mail_smtphost".to_string(), smtp.host),
            ("mail_smtpport".to_string(), smtp.port),
            ("mail_smtpsecure".to_string(), smtp.security),
            ("mail_smtpauth".to_string(), "true".to_string()),
            ("mail_smtpauthtype".to_string(), "LOGIN".to_string()),
            ("mail_smtpname".to_string(), smtp.name),
            ("mail_smtppassword".to_string(), smtp.password),
            ("mail_from_address".to_string(), smtp.from_address),
            ("mail_domain".to_string(), smtp.domain),
        ]);
        self.system_config.set_system_values(values).await
    }
}
