use std::time::Duration;

use n8n_deploy::error::{DeployError, DeployResult, Stage, StageExt};

#[test]
fn display_command_not_found() {
    let err = DeployError::CommandNotFound("doctl".into());
    assert_eq!(err.to_string(), "command not found: doctl");
}

#[test]
fn display_ssh_failed() {
    let err = DeployError::SshFailed("timeout".into());
    assert_eq!(err.to_string(), "SSH connection failed: timeout");
}

#[test]
fn display_prerequisite_missing() {
    let err = DeployError::PrerequisiteMissing("doctl".into());
    assert_eq!(err.to_string(), "prerequisite missing: doctl");
}

#[test]
fn display_server_not_found() {
    let err = DeployError::ServerNotFound("n8n-n8n".into());
    assert_eq!(err.to_string(), "server not found: n8n-n8n");
}

#[test]
fn display_provider() {
    let err = DeployError::provider("create droplet", "Error: 429 Too Many Requests");
    assert_eq!(
        err.to_string(),
        "provider error during create droplet: Error: 429 Too Many Requests"
    );
}

#[test]
fn display_readiness_timeout_names_attempts() {
    let err = DeployError::ReadinessTimeout {
        what: "SSH on root@203.0.113.1".into(),
        attempts: 10,
    };
    assert_eq!(err.to_string(), "SSH on root@203.0.113.1 not ready after 10 attempts");
}

#[test]
fn display_timeout() {
    let err = DeployError::Timeout {
        what: "instance 7 becoming active".into(),
        elapsed: Duration::from_secs(300),
    };
    assert_eq!(err.to_string(), "instance 7 becoming active timed out after 300s");
}

#[test]
fn display_remote_command_includes_stderr() {
    let err = DeployError::RemoteCommandFailed {
        command: "docker compose up -d".into(),
        code: 1,
        stderr: "no such image".into(),
    };
    assert_eq!(
        err.to_string(),
        "remote command `docker compose up -d` exited with 1: no such image"
    );
}

#[test]
fn display_env_missing() {
    let err = DeployError::EnvMissing("HOME".into());
    assert_eq!(err.to_string(), "environment variable missing: HOME");
}

#[test]
fn display_other() {
    let err = DeployError::Other("custom error".into());
    assert_eq!(err.to_string(), "custom error");
}

#[test]
fn stage_wraps_once() {
    let result: DeployResult<()> = Err(DeployError::Cancelled);

    let err = result.stage(Stage::Dns).stage(Stage::Verify).unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Dns));
    assert_eq!(err.to_string(), "dns record stage failed: operation cancelled");
    assert!(err.is_interrupt());
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn plain_errors_are_not_interrupts() {
    assert!(!DeployError::Config("x".into()).is_interrupt());
    assert!(DeployError::DeadlineExceeded.is_interrupt());
    assert_eq!(DeployError::Config("x".into()).stage(), None);
}

#[test]
fn from_io_error() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: DeployError = io_err.into();
    assert!(matches!(err, DeployError::Io(_)));
}

#[test]
fn from_json_error() {
    let json_err = serde_json::from_str::<Vec<u64>>("invalid").unwrap_err();
    let err: DeployError = json_err.into();
    assert!(matches!(err, DeployError::Json(_)));
}

#[test]
fn from_yaml_error() {
    let yaml_err = serde_yaml::from_str::<Vec<u64>>("{").unwrap_err();
    let err: DeployError = yaml_err.into();
    assert!(matches!(err, DeployError::Yaml(_)));
}
