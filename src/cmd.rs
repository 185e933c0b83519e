use std::process::{Output, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub async fn run(program: &str, args: &[&str]) -> DeployResult<String> {
    let output = output(program, args).await?;
    check(program, args, &output)
}

/// Run a command and return its raw output, whatever the exit
/// status.
pub async fn output(program: &str, args: &[&str]) -> DeployResult<Output> {
    debug!(command = %format_command(program, args), "spawning");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| spawn_error(program, e))
}

/// Run a command that pipes its stdin from a byte slice.
pub async fn output_with_stdin(
    program: &str,
    args: &[&str],
    stdin_data: &[u8],
) -> DeployResult<Output> {
    debug!(command = %format_command(program, args), bytes = stdin_data.len(), "spawning with stdin");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_data).await?;
        stdin.shutdown().await?;
    }

    Ok(child.wait_with_output().await?)
}

/// Check if a command exists on PATH.
pub async fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|s| s.success())
}

fn check(program: &str, args: &[&str], output: &Output) -> DeployResult<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(DeployError::CommandFailed {
            command: format_command(program, args),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(program.to_string())
    } else {
        DeployError::Io(e)
    }
}

pub(crate) fn format_command(program: &str, args: &[&str]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(args.iter().map(|a| (*a).to_string()));
    parts.join(" ")
}
