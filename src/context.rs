use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, DeployResult};

/// Cancellation and deadline shared by every wait in a run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Deadline `timeout` from now. An earlier existing deadline
    /// wins.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> DeployResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        if self.remaining().is_some_and(|r| r.is_zero()) {
            return Err(DeployError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Sleep for `duration`, clamped to the deadline. Returns as soon
    /// as the token is cancelled.
    pub async fn sleep(&self, duration: Duration) -> DeployResult<()> {
        self.check()?;
        let clamped = match self.remaining() {
            Some(remaining) if remaining < duration => remaining,
            _ => duration,
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            () = tokio::time::sleep(clamped) => {}
        }

        if clamped < duration {
            return Err(DeployError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` unless cancelled or past the deadline first.
    pub async fn run<T, F>(&self, fut: F) -> DeployResult<T>
    where
        F: Future<Output = DeployResult<T>>,
    {
        self.check()?;
        let bounded = async {
            match self.remaining() {
                Some(remaining) => tokio::time::timeout(remaining, fut)
                    .await
                    .map_err(|_| DeployError::DeadlineExceeded)?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DeployError::Cancelled),
            result = bounded => result,
        }
    }
}
