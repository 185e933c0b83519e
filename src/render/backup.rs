use crate::remote::shell_quote;
use crate::spec::{BackupSchedule, DeploymentSpec};

pub const CRON_PATH: &str = "/etc/cron.d/n8n-backup";

/// Shell script dumping the n8n database into `<workdir>/backups`
/// and pruning dumps older than the retention.
#[must_use]
pub fn script(spec: &DeploymentSpec, schedule: &BackupSchedule) -> String {
    let dir = shell_quote(spec.remote_dir());
    format!(
        "#!/bin/sh\n\
         set -eu\n\
         cd {dir}\n\
         mkdir -p backups\n\
         ts=$(date +%Y%m%d-%H%M%S)\n\
         docker compose exec -T postgres sh -c 'pg_dump -U \"$POSTGRES_USER\" \"$POSTGRES_DB\"' \
         | gzip > \"backups/n8n-$ts.sql.gz\"\n\
         find backups -name 'n8n-*.sql.gz' -mtime +{} -delete\n",
        schedule.retention_days
    )
}

/// `/etc/cron.d` entry running the backup script as root.
#[must_use]
pub fn cron_entry(spec: &DeploymentSpec, schedule: &BackupSchedule) -> String {
    let script = shell_quote(&format!("{}/backup.sh", spec.remote_dir()));
    format!(
        "SHELL=/bin/sh\n{} root {script} >> /var/log/n8n-backup.log 2>&1\n",
        schedule.cron
    )
}
