//! In-memory fakes for the host collaborator traits.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use provisiond::host::{
    AppConfigStore, InstanceProbe, MailTransport, OutboundMail, SystemConfigStore, User,
    UserDirectory,
};
use provisiond::jobs::{BackgroundJob, JobList};
use std::sync::Arc;

// ── Config stores ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryStore {
    app: Mutex<HashMap<(String, String), String>>,
    system: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_system(&self, key: &str, value: &str) {
        self.system
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn seed_app(&self, namespace: &str, key: &str, value: &str) {
        self.app
            .lock()
            .unwrap()
            .insert((namespace.to_string(), key.to_string()), value.to_string());
    }

    pub fn app_value(&self, namespace: &str, key: &str) -> Option<String> {
        self.app
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    pub fn system_value(&self, key: &str) -> Option<String> {
        self.system.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl AppConfigStore for InMemoryStore {
    async fn get_string(&self, namespace: &str, key: &str, default: &str) -> String {
        self.app_value(namespace, key)
            .unwrap_or_else(|| default.to_string())
    }

    async fn set_string(&self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.seed_app(namespace, key, value);
        Ok(())
    }
}

#[async_trait]
impl SystemConfigStore for InMemoryStore {
    async fn get_system_value(&self, key: &str) -> Option<String> {
        self.system_value(key)
    }

    async fn set_system_values(&self, values: HashMap<String, String>) -> anyhow::Result<()> {
        self.system.lock().unwrap().extend(values);
        Ok(())
    }
}

// ── User directory ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeUsers {
    existing: Vec<String>,
    loadable: HashMap<String, User>,
}

impl FakeUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.existing.push(user.uid.clone());
        self.loadable.insert(user.uid.clone(), user);
        self
    }

    /// A uid that passes the exists check but cannot be loaded.
    pub fn with_unloadable(mut self, uid: &str) -> Self {
        self.existing.push(uid.to_string());
        self
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn user_exists(&self, uid: &str) -> bool {
        self.existing.iter().any(|u| u == uid)
    }

    async fn get_user(&self, uid: &str) -> Option<User> {
        self.loadable.get(uid).cloned()
    }
}

// ── Instance probe ───────────────────────────────────────────────────────────

pub struct FakeProbe {
    status: Option<u16>,
    calls: AtomicU32,
}

impl FakeProbe {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            calls: AtomicU32::new(0),
        }
    }

    /// Simulates a network failure on every probe.
    pub fn failing() -> Self {
        Self {
            status: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InstanceProbe for FakeProbe {
    async fn get_status(&self, _url: &str) -> anyhow::Result<u16> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.status.ok_or_else(|| anyhow!("connection refused"))
    }
}

// ── Job list ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingJobList {
    added: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingJobList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobList for RecordingJobList {
    async fn add(&self, job: Arc<dyn BackgroundJob>, argument: &str) {
        self.added
            .lock()
            .unwrap()
            .push((job.name().to_string(), argument.to_string()));
    }

    async fn remove(&self, name: &str) {
        self.removed.lock().unwrap().push(name.to_string());
    }
}

// ── Mail transport ───────────────────────────────────────────────────────────

pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundMail>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutboundMail) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("smtp relay is down"));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
