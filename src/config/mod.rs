//! Daemon configuration.
//!
//! Priority: CLI / env var  >  TOML (`{data_dir}/config.toml`)  >  built-in
//! default. Secrets-file paths are injected configuration so tests can point
//! them at fixtures instead of the vault mounts.

use std::path::PathBuf;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use tracing::warn;

const DEFAULT_PORT: u16 = 8710;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_PROBE_PATH: &str = "/status.php";
const DEFAULT_ADMIN_SECRETS_PATH: &str = "/vault/secrets/adminconfig";
const DEFAULT_SMTP_SECRETS_PATH: &str = "/vault/secrets/smtpconfig";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// `{data_dir}/config.toml` — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST API port (default: 8710).
    port: Option<u16>,
    /// Bind address for the REST API (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Post-setup poll interval in seconds (default: 2).
    poll_interval_secs: Option<u64>,
    /// Path probed on the public URL to decide readiness (default: "/status.php").
    probe_path: Option<String>,
    /// Admin secrets file (default: /vault/secrets/adminconfig).
    admin_secrets_path: Option<PathBuf>,
    /// SMTP secrets file (default: /vault/secrets/smtpconfig).
    smtp_secrets_path: Option<PathBuf>,
    /// Log level filter string, e.g. "debug", "info,provisiond=trace" (default: "info").
    log: Option<String>,
    /// Secret used to seal password-reset tokens. Generated and persisted
    /// to `{data_dir}/secret` when absent.
    secret: Option<String>,
}

/// CLI/env overrides, resolved by `main`.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub probe_path: Option<String>,
    pub admin_secrets_path: Option<PathBuf>,
    pub smtp_secrets_path: Option<PathBuf>,
    pub log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub bind_address: String,
    pub poll_interval: Duration,
    pub probe_path: String,
    pub admin_secrets_path: PathBuf,
    pub smtp_secrets_path: PathBuf,
    pub log: String,
    pub secret: String,
}

impl DaemonConfig {
    pub fn load(data_dir: PathBuf, overrides: Overrides) -> Self {
        let toml_config = read_toml_config(&data_dir.join("config.toml"));
        let secret = toml_config
            .secret
            .clone()
            .unwrap_or_else(|| load_or_create_secret(&data_dir));

        Self {
            port: overrides.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            bind_address: overrides
                .bind_address
                .or(toml_config.bind_address)
                .unwrap_or_else(default_bind_address),
            poll_interval: Duration::from_secs(
                overrides
                    .poll_interval_secs
                    .or(toml_config.poll_interval_secs)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            probe_path: overrides
                .probe_path
                .or(toml_config.probe_path)
                .unwrap_or_else(|| DEFAULT_PROBE_PATH.to_string()),
            admin_secrets_path: overrides
                .admin_secrets_path
                .or(toml_config.admin_secrets_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ADMIN_SECRETS_PATH)),
            smtp_secrets_path: overrides
                .smtp_secrets_path
                .or(toml_config.smtp_secrets_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SMTP_SECRETS_PATH)),
            log: overrides
                .log
                .or(toml_config.log)
                .unwrap_or_else(|| "info".to_string()),
            secret,
            data_dir,
        }
    }
}

fn read_toml_config(path: &std::path::Path) -> TomlConfig {
    match std::fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "config.toml is unparsable, using defaults");
            TomlConfig::default()
        }),
        Err(_) => TomlConfig::default(),
    }
}

/// Read `{data_dir}/secret`, generating and persisting a fresh one on first
/// run. Falls back to an ephemeral secret if the data dir is not writable —
/// reset links then break across restarts, which is logged.
fn load_or_create_secret(data_dir: &std::path::Path) -> String {
    let path = data_dir.join("secret");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let existing = existing.trim().to_string();
        if !existing.is_empty() {
            return existing;
        }
    }
    let fresh: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    if let Err(e) = std::fs::write(&path, &fresh) {
        warn!(path = %path.display(), error = %e, "could not persist the daemon secret, using an ephemeral one");
    }
    fresh
}
