use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::DeployResult;
use crate::remote::{RemoteExecutor, RemoteHost};
use crate::render::RenderedFile;

/// Installs Docker with the compose plugin from the upstream
/// convenience script.
const INSTALL_DOCKER: &str = "curl -fsSL https://get.docker.com | sh && \
     systemctl enable --now docker";

/// Adds the compose plugin next to a distribution Docker package
/// (`docker.io` ships without it).
const INSTALL_COMPOSE: &str = "export DEBIAN_FRONTEND=noninteractive; \
     apt-get update -q && \
     (apt-get install -y -q docker-compose-v2 || apt-get install -y -q docker-compose-plugin)";

const HAS_DOCKER: &str = "command -v docker";

/// Opens SSH and HTTP(S) when ufw is present. Re-running is a no-op.
const CONFIGURE_FIREWALL: &str = "command -v ufw >/dev/null 2>&1 || exit 0; \
     ufw allow OpenSSH && ufw allow 80/tcp && ufw allow 443/tcp && \
     ufw --force enable";

/// Materializes rendered files on the host and drives the container
/// runtime there.
pub struct RemoteConfigurator {
    remote: Arc<dyn RemoteExecutor>,
}

impl RemoteConfigurator {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteExecutor>) -> Self {
        Self { remote }
    }

    /// Create parent directories, then write each file once.
    pub async fn configure_host(&self, host: &RemoteHost, files: &[RenderedFile]) -> DeployResult<()> {
        let dirs: BTreeSet<&str> = files
            .iter()
            .filter_map(|f| Path::new(&f.path).parent().and_then(Path::to_str))
            .filter(|d| !d.is_empty())
            .collect();

        for dir in dirs {
            let argv = ["mkdir", "-p", dir];
            self.remote.exec(host, &argv).await?.check(&argv)?;
        }

        for file in files {
            info!(path = %file.path, mode = format!("{:o}", file.mode), "writing remote file");
            self.remote
                .write_file(host, &file.path, file.contents.as_bytes(), file.mode)
                .await?;
        }
        Ok(())
    }

    /// Make sure Docker and the compose plugin are present. Safe to
    /// run against an already configured host.
    pub async fn install_runtime(&self, host: &RemoteHost) -> DeployResult<()> {
        let probe = ["docker", "compose", "version"];
        let installed = self.remote.exec(host, &probe).await?;
        if installed.success() {
            debug!(version = %installed.stdout.trim(), "container runtime already installed");
        } else {
            let has_docker = ["sh", "-c", HAS_DOCKER];
            let script = if self.remote.exec(host, &has_docker).await?.success() {
                info!(%host, "docker present without compose, installing compose plugin");
                INSTALL_COMPOSE
            } else {
                info!(%host, "installing container runtime");
                INSTALL_DOCKER
            };
            let install = ["sh", "-c", script];
            self.remote.exec(host, &install).await?.check(&install)?;
            self.remote.exec(host, &probe).await?.check(&probe)?;
        }

        let firewall = ["sh", "-c", CONFIGURE_FIREWALL];
        self.remote.exec(host, &firewall).await?.check(&firewall)?;
        Ok(())
    }

    /// `docker compose up -d` for the stack in `workdir`.
    pub async fn start_stack(&self, host: &RemoteHost, workdir: &str) -> DeployResult<()> {
        let compose_file = format!("{workdir}/docker-compose.yml");
        let argv = [
            "docker",
            "compose",
            "--project-directory",
            workdir,
            "-f",
            &compose_file,
            "up",
            "-d",
            "--remove-orphans",
        ];
        info!(%host, workdir, "starting stack");
        self.remote.exec(host, &argv).await?.check(&argv)?;
        Ok(())
    }

    /// Output of `docker compose ps` for the stack.
    pub async fn stack_status(&self, host: &RemoteHost, workdir: &str) -> DeployResult<String> {
        let compose_file = format!("{workdir}/docker-compose.yml");
        let argv = [
            "docker",
            "compose",
            "--project-directory",
            workdir,
            "-f",
            &compose_file,
            "ps",
        ];
        Ok(self.remote.exec(host, &argv).await?.check(&argv)?.stdout)
    }
}
