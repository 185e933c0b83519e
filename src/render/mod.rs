//! Files written to the deployment host.

pub mod backup;
pub mod caddyfile;
pub mod compose;
pub mod env;

use crate::error::DeployResult;
use crate::spec::DeploymentSpec;

/// A file to materialize on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: String,
    pub contents: String,
    pub mode: u32,
}

impl RenderedFile {
    #[must_use]
    pub fn new(path: impl Into<String>, contents: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode,
        }
    }
}

/// Render every file the host needs for `spec`: the compose
/// manifest, the Caddyfile and the environment file, plus the backup
/// script and cron entry when backups are enabled.
pub fn render_all(spec: &DeploymentSpec) -> DeployResult<Vec<RenderedFile>> {
    let dir = spec.remote_dir();
    let mut files = vec![
        RenderedFile::new(format!("{dir}/docker-compose.yml"), compose::render(spec)?, 0o644),
        RenderedFile::new(format!("{dir}/Caddyfile"), caddyfile::render(spec), 0o644),
        RenderedFile::new(format!("{dir}/.env"), env::render(spec), 0o600),
    ];

    if let Some(schedule) = &spec.backups {
        files.push(RenderedFile::new(
            format!("{dir}/backup.sh"),
            backup::script(spec, schedule),
            0o700,
        ));
        files.push(RenderedFile::new(
            backup::CRON_PATH,
            backup::cron_entry(spec, schedule),
            0o644,
        ));
    }

    Ok(files)
}
