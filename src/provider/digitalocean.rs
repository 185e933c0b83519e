use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::provider::{
    CloudProvider, DnsRecord, Droplet, DropletStatus, NewDnsRecord, NewDroplet, SshKey,
};

/// `DigitalOcean` control plane driven through the `doctl` CLI.
///
/// Authentication is whatever `doctl` is configured with
/// (`doctl auth init` or `DIGITALOCEAN_ACCESS_TOKEN`).
pub struct DigitalOcean {
    pub binary: String,
    pub context: Option<String>,
}

impl DigitalOcean {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "doctl".to_string(),
            context: None,
        }
    }

    /// Use a named `doctl` auth context instead of the default.
    #[must_use]
    pub fn context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }

    /// Check that `doctl` is installed and authenticated.
    pub async fn check_prerequisites(&self) -> DeployResult<()> {
        if !cmd::command_exists(&self.binary).await {
            return Err(DeployError::PrerequisiteMissing(
                "doctl is not installed. \
                 Install with: brew install doctl"
                    .into(),
            ));
        }

        self.doctl("account get", vec!["account".into(), "get".into()])
            .await
            .map_err(|_| {
                DeployError::PrerequisiteMissing(
                    "doctl is not authenticated. \
                     Run: doctl auth init"
                        .into(),
                )
            })?;

        debug!("doctl prerequisites OK");
        Ok(())
    }

    async fn doctl(&self, operation: &str, mut args: Vec<String>) -> DeployResult<String> {
        if let Some(context) = &self.context {
            args.push("--context".into());
            args.push(context.clone());
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd::run(&self.binary, &refs)
            .await
            .map_err(|e| match e {
                DeployError::CommandFailed { stderr, .. } => DeployError::provider(operation, stderr),
                other => other,
            })
    }
}

impl Default for DigitalOcean {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for DigitalOcean {
    async fn list_droplets(&self) -> DeployResult<Vec<Droplet>> {
        let out = self
            .doctl("list droplets", args(&["compute", "droplet", "list", "--output", "json"]))
            .await?;
        parse_droplets(&out)
    }

    async fn get_droplet(&self, id: u64) -> DeployResult<Option<Droplet>> {
        let id = id.to_string();
        let result = self
            .doctl(
                "get droplet",
                args(&["compute", "droplet", "get", &id, "--output", "json"]),
            )
            .await;

        match result {
            Ok(out) => Ok(parse_droplets(&out)?.into_iter().next()),
            Err(DeployError::Provider { message, .. }) if is_not_found(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_droplet(&self, request: &NewDroplet) -> DeployResult<Droplet> {
        info!(name = %request.name, region = %request.region, size = %request.size, "creating droplet");
        let out = self
            .doctl("create droplet", droplet_create_args(request))
            .await?;
        parse_droplets(&out)?
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::provider("create droplet", "empty response"))
    }

    async fn delete_droplet(&self, id: u64) -> DeployResult<()> {
        let id = id.to_string();
        self.doctl(
            "delete droplet",
            args(&["compute", "droplet", "delete", &id, "--force"]),
        )
        .await?;
        Ok(())
    }

    async fn list_dns_records(&self, domain: &str) -> DeployResult<Vec<DnsRecord>> {
        let out = self
            .doctl(
                "list dns records",
                args(&["compute", "domain", "records", "list", domain, "--output", "json"]),
            )
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn create_dns_record(
        &self,
        domain: &str,
        record: &NewDnsRecord,
    ) -> DeployResult<DnsRecord> {
        let out = self
            .doctl("create dns record", dns_create_args(domain, record))
            .await?;
        first_record(&out, "create dns record")
    }

    async fn update_dns_record(
        &self,
        domain: &str,
        id: u64,
        data: &str,
    ) -> DeployResult<DnsRecord> {
        let id = id.to_string();
        let out = self
            .doctl(
                "update dns record",
                args(&[
                    "compute",
                    "domain",
                    "records",
                    "update",
                    domain,
                    "--record-id",
                    &id,
                    "--record-data",
                    data,
                    "--output",
                    "json",
                ]),
            )
            .await?;
        first_record(&out, "update dns record")
    }

    async fn delete_dns_record(&self, domain: &str, id: u64) -> DeployResult<()> {
        let id = id.to_string();
        self.doctl(
            "delete dns record",
            args(&["compute", "domain", "records", "delete", domain, &id, "--force"]),
        )
        .await?;
        Ok(())
    }

    async fn list_ssh_keys(&self) -> DeployResult<Vec<SshKey>> {
        let out = self
            .doctl("list ssh keys", args(&["compute", "ssh-key", "list", "--output", "json"]))
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> DeployResult<SshKey> {
        let out = self
            .doctl(
                "create ssh key",
                args(&[
                    "compute",
                    "ssh-key",
                    "create",
                    name,
                    "--public-key",
                    public_key,
                    "--output",
                    "json",
                ]),
            )
            .await?;
        let keys: Vec<SshKey> = serde_json::from_str(&out)?;
        keys.into_iter()
            .next()
            .ok_or_else(|| DeployError::provider("create ssh key", "empty response"))
    }

    async fn delete_ssh_key(&self, id: u64) -> DeployResult<()> {
        let id = id.to_string();
        self.doctl(
            "delete ssh key",
            args(&["compute", "ssh-key", "delete", &id, "--force"]),
        )
        .await?;
        Ok(())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

fn is_not_found(message: &str) -> bool {
    message.contains("404") || message.contains("could not be found")
}

fn first_record(out: &str, operation: &str) -> DeployResult<DnsRecord> {
    let records: Vec<DnsRecord> = serde_json::from_str(out)?;
    records
        .into_iter()
        .next()
        .ok_or_else(|| DeployError::provider(operation, "empty response"))
}

/// Arguments for `doctl compute droplet create`. Waits for the
/// provider to finish creation before returning.
#[must_use]
pub fn droplet_create_args(request: &NewDroplet) -> Vec<String> {
    let mut out = args(&[
        "compute",
        "droplet",
        "create",
        &request.name,
        "--image",
        &request.image,
        "--size",
        &request.size,
        "--region",
        &request.region,
    ]);
    if !request.ssh_key_ids.is_empty() {
        let ids: Vec<String> = request.ssh_key_ids.iter().map(ToString::to_string).collect();
        out.push("--ssh-keys".into());
        out.push(ids.join(","));
    }
    if !request.tags.is_empty() {
        out.push("--tag-names".into());
        out.push(request.tags.join(","));
    }
    out.extend(args(&["--enable-monitoring", "--wait", "--output", "json"]));
    out
}

/// Arguments for `doctl compute domain records create`.
#[must_use]
pub fn dns_create_args(domain: &str, record: &NewDnsRecord) -> Vec<String> {
    let ttl = record.ttl.to_string();
    args(&[
        "compute",
        "domain",
        "records",
        "create",
        domain,
        "--record-type",
        &record.record_type,
        "--record-name",
        &record.name,
        "--record-data",
        &record.data,
        "--record-ttl",
        &ttl,
        "--output",
        "json",
    ])
}

#[derive(Deserialize)]
struct RawDroplet {
    id: u64,
    name: String,
    status: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    networks: RawNetworks,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
struct RawNetworks {
    #[serde(default)]
    v4: Vec<RawAddress>,
}

#[derive(Deserialize)]
struct RawAddress {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Parse the JSON array `doctl` prints for droplet commands.
pub fn parse_droplets(json: &str) -> DeployResult<Vec<Droplet>> {
    let raw: Vec<RawDroplet> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(Droplet::from).collect())
}

impl From<RawDroplet> for Droplet {
    fn from(raw: RawDroplet) -> Self {
        let public_ipv4 = raw
            .networks
            .v4
            .into_iter()
            .find(|a| a.kind == "public")
            .map(|a| a.ip_address);
        let created_at = raw
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));

        Self {
            id: raw.id,
            name: raw.name,
            status: DropletStatus::parse(&raw.status),
            public_ipv4,
            created_at,
            tags: raw.tags.unwrap_or_default(),
        }
    }
}
