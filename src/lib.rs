//! provisiond — post-install provisioning daemon.
//!
//! On installation completion it provisions admin and SMTP settings from
//! vault secrets files, then polls the instance until it is publicly
//! reachable and sends the initial admin a welcome mail. Progress is tracked
//! by a persisted three-state flag (`UNKNOWN` → `INIT` → `DONE`).

pub mod capabilities;
pub mod config;
pub mod host;
pub mod jobs;
pub mod listener;
pub mod mail;
pub mod rest;
pub mod secrets;

use std::sync::Arc;

use capabilities::CapabilityRegistry;
use config::DaemonConfig;
use host::{AppConfigStore, SystemConfigStore, UserDirectory};
use jobs::JobList;

/// App-config namespace for this daemon's own persisted flags.
pub const APP_ID: &str = "provisiond";

/// Shared application state passed to REST handlers and background tasks.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub app_config: Arc<dyn AppConfigStore>,
    pub system_config: Arc<dyn SystemConfigStore>,
    pub users: Arc<dyn UserDirectory>,
    pub job_list: Arc<dyn JobList>,
    pub capabilities: Arc<CapabilityRegistry>,
}
