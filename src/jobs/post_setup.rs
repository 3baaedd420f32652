//! The post-setup job: waits for the instance to become publicly reachable,
//! then sends the initial admin their welcome mail.
//!
//! Progress is tracked by a persisted three-state flag. Every failure mode in
//! the send path is non-fatal — the job simply returns and the scheduler
//! re-invokes it on the next poll. There is no retry cap: the loop ends only
//! when the flag reaches `DONE` (or the job is removed externally).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::host::{AppConfigStore, InstanceProbe, SystemConfigStore, UserDirectory};
use crate::mail::{SendOutcome, WelcomeMailSender};
use crate::APP_ID;

use super::{BackgroundJob, JobList};

/// Job name in the job list.
pub const POST_SETUP_JOB: &str = "post_setup";

/// App-config key holding the job-status flag.
pub const STATUS_KEY: &str = "post_install";

/// System-config key holding the public base URL of the instance.
pub const PUBLIC_URL_KEY: &str = "public_url";

/// Persisted job-status flag. Monotonic: `Unknown → Init → Done`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Flag absent — the listener has not run yet.
    Unknown,
    /// Listener has fired; welcome mail is pending.
    Init,
    /// Terminal: welcome mail processed (or deliberately skipped).
    Done,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Unknown => "UNKNOWN",
            JobStatus::Init => "INIT",
            JobStatus::Done => "DONE",
        }
    }

    /// Any unrecognized value reads as `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "INIT" => JobStatus::Init,
            "DONE" => JobStatus::Done,
            _ => JobStatus::Unknown,
        }
    }
}

pub struct PostSetupJob {
    app_config: Arc<dyn AppConfigStore>,
    system_config: Arc<dyn SystemConfigStore>,
    users: Arc<dyn UserDirectory>,
    probe: Arc<dyn InstanceProbe>,
    job_list: Arc<dyn JobList>,
    mail: Arc<dyn WelcomeMailSender>,
    probe_path: String,
}

impl PostSetupJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_config: Arc<dyn AppConfigStore>,
        system_config: Arc<dyn SystemConfigStore>,
        users: Arc<dyn UserDirectory>,
        probe: Arc<dyn InstanceProbe>,
        job_list: Arc<dyn JobList>,
        mail: Arc<dyn WelcomeMailSender>,
        probe_path: impl Into<String>,
    ) -> Self {
        Self {
            app_config,
            system_config,
            users,
            probe,
            job_list,
            mail,
            probe_path: probe_path.into(),
        }
    }

    async fn send_initial_welcome_mail(&self, admin_uid: &str) {
        let base_url = self
            .system_config
            .get_system_value(PUBLIC_URL_KEY)
            .await
            .unwrap_or_default();
        if base_url.is_empty() {
            debug!("public base URL is not configured yet, retrying later");
            return;
        }
        if !self.is_url_available(&base_url).await {
            debug!(url = %base_url, "instance is not reachable yet, retrying with the next poll");
            return;
        }

        if !self.users.user_exists(admin_uid).await {
            warn!(uid = %admin_uid, "could not find the install admin user, skipping welcome mail");
            return;
        }
        let Some(user) = self.users.get_user(admin_uid).await else {
            debug!(uid = %admin_uid, "install admin user could not be loaded, retrying later");
            return;
        };

        match self.mail.send_welcome_mail(&user, true).await {
            Ok(SendOutcome::Sent) => debug!(uid = %user.uid, "welcome mail sent"),
            // No address on file: skip the send but still mark complete.
            Ok(SendOutcome::SkippedNoEmail) => {
                debug!(uid = %user.uid, "admin user has no email address, skipping welcome mail")
            }
            Err(e) => {
                warn!(uid = %user.uid, error = %e, "failed to send welcome mail, retrying later");
                return;
            }
        }

        if let Err(e) = self
            .app_config
            .set_string(APP_ID, STATUS_KEY, JobStatus::Done.as_str())
            .await
        {
            warn!(error = %e, "failed to persist job status, retrying later");
            return;
        }
        self.job_list.remove(POST_SETUP_JOB).await;
    }

    async fn is_url_available(&self, base_url: &str) -> bool {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.probe_path);
        debug!(%url, "probing instance availability");
        match self.probe.get_status(&url).await {
            Ok(code) => (200..300).contains(&code),
            // Network errors and non-2xx are the same "not ready".
            Err(e) => {
                debug!(%url, error = %e, "probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl BackgroundJob for PostSetupJob {
    fn name(&self) -> &'static str {
        POST_SETUP_JOB
    }

    async fn run(&self, argument: &str) {
        let raw = self
            .app_config
            .get_string(APP_ID, STATUS_KEY, JobStatus::Unknown.as_str())
            .await;
        match JobStatus::parse(&raw) {
            JobStatus::Done => {
                debug!("job was already successful, removing it from the job list");
                self.job_list.remove(POST_SETUP_JOB).await;
            }
            JobStatus::Unknown => {
                debug!("post-install status has not been recorded yet, waiting for the listener");
            }
            JobStatus::Init => {
                debug!("post-install job started");
                self.send_initial_welcome_mail(argument).await;
                debug!("post-install job finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [JobStatus::Unknown, JobStatus::Init, JobStatus::Done] {
            assert_eq!(JobStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unrecognized_status_reads_as_unknown() {
        assert_eq!(JobStatus::parse(""), JobStatus::Unknown);
        assert_eq!(JobStatus::parse("done"), JobStatus::Unknown);
        assert_eq!(JobStatus::parse("PENDING"), JobStatus::Unknown);
    }
}
