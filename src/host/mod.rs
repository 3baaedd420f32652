//! Trait seams for the host-platform collaborators.
//!
//! The provisioning flow only ever talks to these traits; production adapters
//! live in the submodules, tests substitute in-memory fakes.

pub mod probe;
pub mod smtp;
pub mod store;
pub mod users;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A user as exposed by the host's user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub display_name: String,
    /// Users may not have a mail address on file.
    pub email: Option<String>,
}

/// Persisted per-app key-value configuration.
#[async_trait]
pub trait AppConfigStore: Send + Sync {
    /// Read a value, falling back to `default` when the key is absent.
    async fn get_string(&self, namespace: &str, key: &str, default: &str) -> String;

    async fn set_string(&self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Host-wide system configuration.
#[async_trait]
pub trait SystemConfigStore: Send + Sync {
    async fn get_system_value(&self, key: &str) -> Option<String>;

    /// Bulk write of system settings (used for one-shot SMTP provisioning).
    async fn set_system_values(&self, values: HashMap<String, String>) -> anyhow::Result<()>;
}

/// Lookup of users by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, uid: &str) -> bool;

    async fn get_user(&self, uid: &str) -> Option<User>;
}

/// Reachability probe against the public instance URL.
#[async_trait]
pub trait InstanceProbe: Send + Sync {
    /// Issue a GET and return the HTTP status code. Network failures are
    /// errors; interpreting the code is up to the caller.
    async fn get_status(&self, url: &str) -> anyhow::Result<u16>;
}

/// A fully built outbound message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub to_display_name: String,
    pub from_address: String,
    pub subject: String,
    pub body_text: String,
}

/// Dispatches built messages (SMTP in production, a recorder in tests).
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> anyhow::Result<()>;
}
