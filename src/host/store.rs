//! JSON-file-backed config stores.
//!
//! Both the per-app and the system key-value stores persist into a single
//! `state.json` in the data directory. Writes go through a temp file and an
//! atomic rename so a crash mid-write never leaves a truncated store.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use super::{AppConfigStore, SystemConfigStore};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    apps: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    system: HashMap<String, String>,
}

pub struct JsonConfigStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonConfigStore {
    /// Open the store, loading existing state if present. An unparsable file
    /// is logged and replaced with an empty store rather than failing startup.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "config store is unparsable, starting empty");
                StoreData::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &StoreData) -> anyhow::Result<()> {
        let tmp = self.path.with_extension("tmp");
        let raw = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AppConfigStore for JsonConfigStore {
    async fn get_string(&self, namespace: &str, key: &str, default: &str) -> String {
        self.data
            .read()
            .await
            .apps
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    async fn set_string(&self, namespace: &str, key: &str, value: &str) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        data.apps
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.persist(&data).await
    }
}

#[async_trait]
impl SystemConfigStore for JsonConfigStore {
    async fn get_system_value(&self, key: &str) -> Option<String> {
        self.data.read().await.system.get(key).cloned()
    }

    async fn set_system_values(&self, values: HashMap<String, String>) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        data.system.extend(values);
        self.persist(&data).await
    }
}
