//! Post-deployment health check against the public endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{DeployError, DeployResult};

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Issues one GET against an endpoint and returns the HTTP status.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, url: &str) -> DeployResult<u16>;
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> DeployResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DeployError::Other(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> DeployResult<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeployError::Other(format!("GET {url}: {e}")))?;
        Ok(response.status().as_u16())
    }
}

pub struct Verifier {
    probe: Arc<dyn HealthProbe>,
}

impl Verifier {
    #[must_use]
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    /// Succeed on the first 2xx, retrying with a fixed delay.
    pub async fn verify_healthy(
        &self,
        ctx: &RunContext,
        url: &str,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> DeployResult<()> {
        for attempt in 1..=max_attempts {
            ctx.check()?;

            match ctx.run(self.probe.probe(url)).await {
                Ok(status) if (200..300).contains(&status) => {
                    info!(url, attempt, status, "service healthy");
                    return Ok(());
                }
                Ok(status) => debug!(url, attempt, status, "unhealthy response"),
                Err(e) if e.is_interrupt() => return Err(e),
                Err(e) => debug!(url, attempt, error = %e, "health check request failed"),
            }

            if attempt < max_attempts {
                warn!(url, attempt, max = max_attempts, "health check failed, retrying");
                ctx.sleep(retry_delay).await?;
            }
        }

        Err(DeployError::VerificationFailed {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }
}
