use std::time::Duration;

use monitor_core::BackoffPolicy;
use monitor_logging::{monitor_debug, monitor_warn};
use url::Url;

use crate::SetupError;

/// Readiness check against the backend.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ReqwestHealthProbe {
    client: reqwest::Client,
    url: Url,
}

impl ReqwestHealthProbe {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| SetupError::HttpClient(err.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl HealthProbe for ReqwestHealthProbe {
    async fn check(&self) -> bool {
        match self.client.get(self.url.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                monitor_debug!("Health check {} returned {}", self.url, response.status());
                false
            }
            Err(err) => {
                monitor_debug!("Health check {} failed: {}", self.url, err);
                false
            }
        }
    }
}

/// Probe until ready or out of attempts, backing off between attempts.
///
/// Each attempt is bounded by `timeout`. Returns whether the backend reported
/// ready; callers proceed either way.
pub async fn wait_until_ready(
    probe: &dyn HealthProbe,
    policy: BackoffPolicy,
    max_attempts: u32,
    timeout: Duration,
) -> bool {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if let Ok(true) = tokio::time::timeout(timeout, probe.check()).await {
            return true;
        }
        if attempt < max_attempts {
            let delay = policy.delay(attempt);
            monitor_debug!(
                "Backend not ready (attempt {}/{}), retrying in {:?}",
                attempt,
                max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
    monitor_warn!(
        "Backend not ready after {} attempts; connecting anyway",
        max_attempts
    );
    false
}
