use std::fmt;

use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

/// Tag carried by every instance this crate creates.
pub const DEPLOY_TAG: &str = "n8n-deploy";

const APP: &str = "n8n";

/// A secret string. Never printed by `Debug` or `Display`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.to_string())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BasicAuth {
    pub user: String,
    pub password: Secret,
}

/// Nightly `pg_dump` of the n8n database on the droplet itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackupSchedule {
    /// Five-field cron expression.
    pub cron: String,
    pub retention_days: u32,
}

impl Default for BackupSchedule {
    fn default() -> Self {
        Self {
            cron: "0 3 * * *".to_string(),
            retention_days: 7,
        }
    }
}

/// What the caller wants deployed. Immutable for the duration of a
/// run.
///
/// # Example
///
/// ```
/// use n8n_deploy::DeploymentSpec;
///
/// let spec = DeploymentSpec::new("example.com", "n8n")
///     .size("s-2vcpu-2gb")
///     .database("n8n", "hunter2", "n8n")
///     .encryption_key("0123456789abcdef")
///     .acme_email("ops@example.com");
///
/// assert_eq!(spec.instance_name(), "n8n-n8n");
/// assert_eq!(spec.url(), "https://n8n.example.com");
/// assert!(spec.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeploymentSpec {
    pub domain: String,
    pub subdomain: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub n8n_version: String,
    pub postgres_version: String,
    pub db_user: String,
    pub db_password: Secret,
    pub db_name: String,
    pub acme_email: String,
    pub basic_auth: Option<BasicAuth>,
    pub encryption_key: Secret,
    pub timezone: String,
    pub app_port: u16,
    pub workdir: String,
    pub backups: Option<BackupSchedule>,
}

impl Default for DeploymentSpec {
    fn default() -> Self {
        Self {
            domain: String::new(),
            subdomain: String::new(),
            region: "fra1".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image: "ubuntu-24-04-x64".to_string(),
            n8n_version: "latest".to_string(),
            postgres_version: "16-alpine".to_string(),
            db_user: "n8n".to_string(),
            db_password: Secret::default(),
            db_name: "n8n".to_string(),
            acme_email: String::new(),
            basic_auth: None,
            encryption_key: Secret::default(),
            timezone: "UTC".to_string(),
            app_port: 5678,
            workdir: "/opt/n8n".to_string(),
            backups: None,
        }
    }
}

impl DeploymentSpec {
    #[must_use]
    pub fn new(domain: &str, subdomain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            subdomain: subdomain.to_string(),
            acme_email: format!("admin@{domain}"),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    #[must_use]
    pub fn size(mut self, size: &str) -> Self {
        self.size = size.to_string();
        self
    }

    #[must_use]
    pub fn image(mut self, image: &str) -> Self {
        self.image = image.to_string();
        self
    }

    #[must_use]
    pub fn n8n_version(mut self, version: &str) -> Self {
        self.n8n_version = version.to_string();
        self
    }

    #[must_use]
    pub fn postgres_version(mut self, version: &str) -> Self {
        self.postgres_version = version.to_string();
        self
    }

    #[must_use]
    pub fn database(mut self, user: &str, password: &str, name: &str) -> Self {
        self.db_user = user.to_string();
        self.db_password = Secret::new(password);
        self.db_name = name.to_string();
        self
    }

    #[must_use]
    pub fn acme_email(mut self, email: &str) -> Self {
        self.acme_email = email.to_string();
        self
    }

    #[must_use]
    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        self.basic_auth = Some(BasicAuth {
            user: user.to_string(),
            password: Secret::new(password),
        });
        self
    }

    #[must_use]
    pub fn encryption_key(mut self, key: &str) -> Self {
        self.encryption_key = Secret::new(key);
        self
    }

    #[must_use]
    pub fn timezone(mut self, tz: &str) -> Self {
        self.timezone = tz.to_string();
        self
    }

    #[must_use]
    pub fn workdir(mut self, dir: &str) -> Self {
        self.workdir = dir.to_string();
        self
    }

    #[must_use]
    pub fn backups(mut self, schedule: BackupSchedule) -> Self {
        self.backups = Some(schedule);
        self
    }

    #[must_use]
    pub fn id(&self) -> DeploymentId {
        DeploymentId::new(&self.domain, &self.subdomain)
    }

    #[must_use]
    pub fn instance_name(&self) -> String {
        self.id().instance_name()
    }

    #[must_use]
    pub fn key_name(&self) -> String {
        self.id().key_name()
    }

    #[must_use]
    pub fn fqdn(&self) -> String {
        self.id().fqdn()
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("https://{}", self.fqdn())
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}/healthz", self.url())
    }

    /// Remote working directory without a trailing slash.
    #[must_use]
    pub fn remote_dir(&self) -> &str {
        self.workdir.trim_end_matches('/')
    }

    #[must_use]
    pub fn n8n_image(&self) -> String {
        format!("docker.n8n.io/n8nio/n8n:{}", self.n8n_version)
    }

    #[must_use]
    pub fn postgres_image(&self) -> String {
        format!("postgres:{}", self.postgres_version)
    }

    /// Reject specs that would fail halfway through a run. Called
    /// before any provider request.
    pub fn validate(&self) -> DeployResult<()> {
        self.id().validate()?;
        for (field, value) in [
            ("region", &self.region),
            ("size", &self.size),
            ("image", &self.image),
            ("n8n_version", &self.n8n_version),
            ("db_user", &self.db_user),
            ("db_name", &self.db_name),
        ] {
            if value.trim().is_empty() {
                return Err(DeployError::Config(format!("{field} must not be empty")));
            }
        }
        for (field, value) in [("db_user", &self.db_user), ("db_name", &self.db_name)] {
            if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DeployError::Config(format!(
                    "{field} may only contain letters, digits and underscores"
                )));
            }
        }
        if !self
            .timezone
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/_+-".contains(c))
        {
            return Err(DeployError::Config(format!(
                "timezone '{}' is not a tz database name",
                self.timezone
            )));
        }
        if !self.acme_email.contains('@')
            || self
                .acme_email
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || "{}\"".contains(c))
        {
            return Err(DeployError::Config(format!(
                "acme_email '{}' is not an email address",
                self.acme_email
            )));
        }
        if self.app_port == 0 {
            return Err(DeployError::Config("app_port must not be 0".into()));
        }
        if !self.workdir.starts_with('/') || self.remote_dir().is_empty() {
            return Err(DeployError::Config("workdir must be an absolute path below /".into()));
        }

        check_secret("db_password", &self.db_password)?;
        check_secret("encryption_key", &self.encryption_key)?;
        if let Some(auth) = &self.basic_auth {
            if auth.user.is_empty() || auth.user.contains(['\'', '\n', '\r']) {
                return Err(DeployError::Config(
                    "basic_auth.user must be non-empty without quotes or newlines".into(),
                ));
            }
            check_secret("basic_auth.password", &auth.password)?;
        }
        if let Some(backups) = &self.backups {
            let charset_ok = backups
                .cron
                .chars()
                .all(|c| c.is_ascii_digit() || " */,-".contains(c));
            if !charset_ok || backups.cron.split_whitespace().count() != 5 {
                return Err(DeployError::Config(format!(
                    "backups.cron '{}' must be five numeric cron fields",
                    backups.cron
                )));
            }
        }
        Ok(())
    }
}

// The compose env-file parser has no escape for a single quote
// inside a single-quoted value, and values are line based.
fn check_secret(field: &str, secret: &Secret) -> DeployResult<()> {
    if secret.is_empty() {
        return Err(DeployError::Config(format!("{field} must not be empty")));
    }
    if secret.expose().contains(['\'', '\n', '\r']) {
        return Err(DeployError::Config(format!(
            "{field} must not contain single quotes or newlines"
        )));
    }
    Ok(())
}

fn is_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_hostname(name: &str) -> bool {
    name.len() <= 253 && name.split('.').all(is_label)
}

/// Stable identity of a deployment. Every provider-side name is
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentId {
    pub domain: String,
    pub subdomain: String,
}

impl DeploymentId {
    #[must_use]
    pub fn new(domain: &str, subdomain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            subdomain: subdomain.to_string(),
        }
    }

    #[must_use]
    pub fn instance_name(&self) -> String {
        format!("{}-{APP}", self.subdomain)
    }

    #[must_use]
    pub fn key_name(&self) -> String {
        format!("{}-deploy", self.subdomain)
    }

    #[must_use]
    pub fn key_tag(&self) -> String {
        key_tag(&self.key_name())
    }

    #[must_use]
    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    pub fn validate(&self) -> DeployResult<()> {
        if !is_hostname(&self.domain) || !self.domain.contains('.') {
            return Err(DeployError::Config(format!(
                "domain '{}' is not a valid DNS name",
                self.domain
            )));
        }
        if !is_label(&self.subdomain) {
            return Err(DeployError::Config(format!(
                "subdomain '{}' must be a single DNS label",
                self.subdomain
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fqdn())
    }
}

/// Tag linking an instance to the SSH key it was created with.
#[must_use]
pub fn key_tag(key_name: &str) -> String {
    format!("{DEPLOY_TAG}-key:{key_name}")
}
