use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DeployError, DeployResult};
use crate::spec::{DeploymentSpec, Secret};

/// Timing and behaviour knobs for a run. Durations are whole
/// seconds in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub active_timeout: u64,
    pub active_poll_interval: u64,
    pub ssh_max_attempts: u32,
    pub ssh_initial_delay: u64,
    pub ssh_max_delay: u64,
    pub health_max_attempts: u32,
    pub health_retry_delay: u64,
    /// Overall deadline for one `deploy` call.
    pub deadline: Option<u64>,
    /// Delete duplicate instances carrying the deployment name.
    pub prune_duplicates: bool,
    pub ssh_user: String,
    pub key_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_timeout: 300,
            active_poll_interval: 5,
            ssh_max_attempts: 10,
            ssh_initial_delay: 5,
            ssh_max_delay: 300,
            health_max_attempts: 30,
            health_retry_delay: 10,
            deadline: Some(1800),
            prune_duplicates: false,
            ssh_user: "root".to_string(),
            key_dir: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub const fn active_timeout(&self) -> Duration {
        Duration::from_secs(self.active_timeout)
    }

    #[must_use]
    pub const fn active_poll_interval(&self) -> Duration {
        Duration::from_secs(self.active_poll_interval)
    }

    #[must_use]
    pub const fn ssh_initial_delay(&self) -> Duration {
        Duration::from_secs(self.ssh_initial_delay)
    }

    #[must_use]
    pub const fn ssh_max_delay(&self) -> Duration {
        Duration::from_secs(self.ssh_max_delay)
    }

    #[must_use]
    pub const fn health_retry_delay(&self) -> Duration {
        Duration::from_secs(self.health_retry_delay)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline.map(Duration::from_secs)
    }

    /// Directory holding local private keys, `$HOME/.ssh` unless
    /// configured.
    pub fn key_dir(&self) -> DeployResult<PathBuf> {
        if let Some(dir) = &self.key_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var("HOME").map_err(|_| DeployError::EnvMissing("HOME".into()))?;
        Ok(PathBuf::from(home).join(".ssh"))
    }
}

/// Contents of a deployment YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    pub deployment: DeploymentSpec,
    #[serde(default)]
    pub settings: Settings,
}

impl DeployConfig {
    pub fn from_yaml(content: &str) -> DeployResult<Self> {
        let mut config: Self = serde_yaml::from_str(content)?;
        if config.deployment.acme_email.is_empty() {
            config.deployment.acme_email = format!("admin@{}", config.deployment.domain);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Let secrets come from the environment instead of the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let spec = &mut self.deployment;
        if let Some(v) = lookup("N8N_DB_PASSWORD") {
            spec.db_password = Secret::new(&v);
        }
        if let Some(v) = lookup("N8N_ENCRYPTION_KEY") {
            spec.encryption_key = Secret::new(&v);
        }
        if let (Some(v), Some(auth)) = (lookup("N8N_BASIC_AUTH_PASSWORD"), spec.basic_auth.as_mut())
        {
            auth.password = Secret::new(&v);
        }
    }
}
