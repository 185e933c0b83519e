use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

pub type DeployResult<T> = Result<T, DeployError>;

/// Pipeline stage a fatal error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Keys,
    Instance,
    Dns,
    Readiness,
    Configure,
    Verify,
    Teardown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Keys => "ssh key",
            Self::Instance => "compute instance",
            Self::Dns => "dns record",
            Self::Readiness => "readiness",
            Self::Configure => "remote configuration",
            Self::Verify => "verification",
            Self::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("provider error during {operation}: {message}")]
    Provider { operation: String, message: String },

    #[error("{what} not ready after {attempts} attempts")]
    ReadinessTimeout { what: String, attempts: u32 },

    #[error("{what} timed out after {}s", .elapsed.as_secs())]
    Timeout { what: String, elapsed: Duration },

    #[error("remote command `{command}` exited with {code}: {stderr}")]
    RemoteCommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("health check on {url} failed after {attempts} attempts")]
    VerificationFailed { url: String, attempts: u32 },

    #[error("command failed: {command}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("SSH connection failed: {0}")]
    SshFailed(String),

    #[error("prerequisite missing: {0}")]
    PrerequisiteMissing(String),

    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("environment variable missing: {0}")]
    EnvMissing(String),

    #[error("{0}")]
    Other(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<DeployError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    pub fn provider(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that failed, when the error went through the pipeline.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Cancellation and deadline errors end a run without further
    /// retries.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            Self::Stage { source, .. } => source.is_interrupt(),
            _ => false,
        }
    }
}

/// Extension for tagging results with the stage that produced them.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> DeployResult<T>;
}

impl<T> StageExt<T> for DeployResult<T> {
    fn stage(self, stage: Stage) -> DeployResult<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}
