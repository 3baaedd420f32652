//! JSON-file-backed user directory.
//!
//! The file is re-read on every lookup: the post-setup flow tolerates the
//! admin user being created after the daemon starts, so lookups must see
//! late additions.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::warn;

use super::{User, UserDirectory};

pub struct JsonUserDirectory {
    path: PathBuf,
}

impl JsonUserDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Vec<User> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "user directory is unparsable");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read user directory");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl UserDirectory for JsonUserDirectory {
    async fn user_exists(&self, uid: &str) -> bool {
        self.load().await.iter().any(|u| u.uid == uid)
    }

    async fn get_user(&self, uid: &str) -> Option<User> {
        self.load().await.into_iter().find(|u| u.uid == uid)
    }
}
