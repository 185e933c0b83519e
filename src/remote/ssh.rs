use std::time::Duration;

use async_trait::async_trait;

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::remote::{CommandOutput, RemoteExecutor, RemoteHost, shell_join};

/// `ssh` exits with 255 when the connection itself failed.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Remote execution through the system `ssh` client. Every call
/// opens its own connection.
#[derive(Debug, Clone)]
pub struct SshSession {
    connect_timeout: Duration,
    known_hosts: Option<String>,
}

impl SshSession {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            known_hosts: None,
        }
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Keep host keys in a dedicated file instead of
    /// `~/.ssh/known_hosts`.
    #[must_use]
    pub fn known_hosts(mut self, path: &str) -> Self {
        self.known_hosts = Some(path.to_string());
        self
    }

    /// Full argument list for running `argv` on `host`.
    #[must_use]
    pub fn build_ssh_args(&self, host: &RemoteHost, argv: &[&str]) -> Vec<String> {
        let mut args = self.ssh_base_args(host);
        args.push(host.to_string());
        args.push(shell_join(argv));
        args
    }

    fn ssh_base_args(&self, host: &RemoteHost) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-i".to_string(),
            host.key.path().to_string_lossy().to_string(),
        ];
        if let Some(file) = &self.known_hosts {
            args.push("-o".to_string());
            args.push(format!("UserKnownHostsFile={file}"));
        }
        args
    }

    fn command_output(host: &RemoteHost, output: &std::process::Output) -> DeployResult<CommandOutput> {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if code == SSH_TRANSPORT_FAILURE {
            return Err(DeployError::SshFailed(format!("{host}: {}", stderr.trim())));
        }
        Ok(CommandOutput {
            code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
        })
    }
}

impl Default for SshSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Command that writes stdin to `$1` and applies mode `$2`. Path and
/// mode arrive as positional parameters, contents only on stdin.
const WRITE_SCRIPT: &str = "umask 077 && cat > \"$1\" && chmod \"$2\" \"$1\"";

#[async_trait]
impl RemoteExecutor for SshSession {
    async fn exec(&self, host: &RemoteHost, argv: &[&str]) -> DeployResult<CommandOutput> {
        let args = self.build_ssh_args(host, argv);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = cmd::output("ssh", &refs).await?;
        Self::command_output(host, &output)
    }

    async fn write_file(
        &self,
        host: &RemoteHost,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> DeployResult<()> {
        let mode = format!("{mode:o}");
        let argv = ["sh", "-c", WRITE_SCRIPT, "sh", path, &mode];
        let args = self.build_ssh_args(host, &argv);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = cmd::output_with_stdin("ssh", &refs, contents).await?;
        Self::command_output(host, &output)?.check(&["write", path])?;
        Ok(())
    }
}
