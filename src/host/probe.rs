//! reqwest-backed instance reachability probe.

use async_trait::async_trait;

use super::InstanceProbe;

/// Probes the public instance URL with plain GET requests. Uses the client's
/// default timeouts; a hang stalls one poll invocation only.
pub struct HttpInstanceProbe {
    client: reqwest::Client,
}

impl HttpInstanceProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpInstanceProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceProbe for HttpInstanceProbe {
    async fn get_status(&self, url: &str) -> anyhow::Result<u16> {
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}
