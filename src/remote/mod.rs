//! Remote execution channel and host configuration.

pub mod configure;
pub mod ssh;

use std::fmt;

use async_trait::async_trait;

use crate::error::{DeployError, DeployResult};
use crate::keys::PrivateKey;

/// Where and as whom remote commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHost {
    pub ip: String,
    pub user: String,
    pub key: PrivateKey,
}

impl RemoteHost {
    #[must_use]
    pub fn new(ip: &str, user: &str, key: PrivateKey) -> Self {
        Self {
            ip: ip.to_string(),
            user: user.to_string(),
            key,
        }
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.ip)
    }
}

/// Result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into an error carrying stderr.
    pub fn check(self, argv: &[&str]) -> DeployResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DeployError::RemoteCommandFailed {
                command: argv.join(" "),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands on, and writes files to, a remote host. No session
/// is kept between calls.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `argv` on the host. A non-zero remote exit is returned in
    /// the output; only transport failures are errors.
    async fn exec(&self, host: &RemoteHost, argv: &[&str]) -> DeployResult<CommandOutput>;

    /// Write `contents` byte for byte to `path` with `mode`. The
    /// parent directory must exist.
    async fn write_file(
        &self,
        host: &RemoteHost,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> DeployResult<()>;
}

/// Quote one argument for a POSIX shell.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Join argv into one command line safe to hand to a remote shell.
#[must_use]
pub fn shell_join(argv: &[&str]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}
