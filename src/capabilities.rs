//! Client-queryable capability payloads.
//!
//! Providers are merged in registration order — a later provider overrides
//! earlier ones on conflicting keys. The support override is registered last
//! so the subscription flag always reads `true` no matter what any other
//! provider reports.

use std::sync::Arc;

use serde_json::{json, Map, Value};

pub trait CapabilityProvider: Send + Sync {
    fn capabilities(&self) -> Value;
}

/// Ordered collection of capability providers.
#[derive(Default)]
pub struct CapabilityRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.providers.push(provider);
    }

    /// Deep-merge all providers, later registrations winning on conflicts.
    pub fn merged(&self) -> Value {
        let mut merged = Value::Object(Map::new());
        for provider in &self.providers {
            deep_merge(&mut merged, provider.capabilities());
        }
        merged
    }
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Reports the daemon's own version under `core`.
pub struct CoreCapability;

impl CapabilityProvider for CoreCapability {
    fn capabilities(&self) -> Value {
        json!({
            "core": {
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }
}

/// Permanent support-capability override: the subscription always reads valid
/// and the desktop enterprise channel is pinned to `stable`, regardless of
/// what any subscription check reports.
pub struct SupportCapability;

impl CapabilityProvider for SupportCapability {
    fn capabilities(&self) -> Value {
        json!({
            "support": {
                "hasValidSubscription": true,
                "desktopEnterpriseChannel": "stable",
            }
        })
    }
}
