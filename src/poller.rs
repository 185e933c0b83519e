//! Waiting for a new instance to become usable.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{DeployError, DeployResult};
use crate::provider::{CloudProvider, Droplet, DropletStatus};
use crate::remote::{RemoteExecutor, RemoteHost};

/// Exponential retry schedule: `initial`, doubling after each failed
/// attempt, never longer than `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(initial: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max_delay,
            max_attempts,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max_delay)
    }

    /// Sum of all delays slept when every attempt fails.
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay(a)).sum()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300), 10)
    }
}

pub struct ReadinessPoller {
    provider: Arc<dyn CloudProvider>,
    remote: Arc<dyn RemoteExecutor>,
}

impl ReadinessPoller {
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>, remote: Arc<dyn RemoteExecutor>) -> Self {
        Self { provider, remote }
    }

    /// Poll the instance every `interval` until it is active with a
    /// public address. Fails fast on an error status.
    pub async fn wait_until_active(
        &self,
        ctx: &RunContext,
        id: u64,
        timeout: Duration,
        interval: Duration,
    ) -> DeployResult<Droplet> {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            ctx.check()?;
            polls += 1;

            match ctx.run(self.provider.get_droplet(id)).await? {
                Some(droplet) => match droplet.status {
                    DropletStatus::Active if droplet.public_ipv4.is_some() => {
                        info!(id, ip = ?droplet.public_ipv4, polls, "instance active");
                        return Ok(droplet);
                    }
                    DropletStatus::Error => {
                        return Err(DeployError::provider(
                            "wait for instance",
                            format!("instance {id} entered an error state"),
                        ));
                    }
                    status => debug!(id, ?status, polls, "instance not ready"),
                },
                None => debug!(id, polls, "instance not visible yet"),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(DeployError::Timeout {
                    what: format!("instance {id} becoming active ({polls} polls)"),
                    elapsed,
                });
            }
            ctx.sleep(interval.min(timeout - elapsed)).await?;
        }
    }

    /// Run `echo ok` over the channel until it succeeds, backing off
    /// exponentially between attempts.
    pub async fn wait_until_ssh_reachable(
        &self,
        ctx: &RunContext,
        host: &RemoteHost,
        backoff: Backoff,
    ) -> DeployResult<()> {
        let probe = ["echo", "ok"];

        for attempt in 1..=backoff.max_attempts {
            ctx.check()?;

            match ctx.run(self.remote.exec(host, &probe)).await {
                Ok(out) if out.success() => {
                    info!(%host, attempt, "SSH reachable");
                    return Ok(());
                }
                Ok(out) => debug!(%host, attempt, code = out.code, "SSH probe failed"),
                Err(e) if e.is_interrupt() => return Err(e),
                Err(e) => debug!(%host, attempt, error = %e, "SSH not reachable"),
            }

            if attempt < backoff.max_attempts {
                let delay = backoff.delay(attempt);
                warn!(
                    %host,
                    attempt,
                    max = backoff.max_attempts,
                    delay_secs = delay.as_secs(),
                    "waiting for SSH"
                );
                ctx.sleep(delay).await?;
            }
        }

        Err(DeployError::ReadinessTimeout {
            what: format!("SSH on {host}"),
            attempts: backoff.max_attempts,
        })
    }
}
