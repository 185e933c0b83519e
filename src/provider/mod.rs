pub mod digitalocean;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeployResult;

/// Provider-reported lifecycle state of a droplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DropletStatus {
    Provisioning,
    Active,
    Error,
}

impl DropletStatus {
    /// Map the provider's status string. `new` is still booting;
    /// anything besides `active` that is not `new` (off, archive)
    /// cannot serve the deployment.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "new" => Self::Provisioning,
            "active" => Self::Active,
            _ => Self::Error,
        }
    }
}

/// A provisioned virtual machine as observed from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: DropletStatus,
    pub public_ipv4: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

/// Parameters for a droplet create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDroplet {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_key_ids: Vec<u64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub data: String,
    #[serde(default)]
    pub ttl: u32,
}

/// Parameters for a DNS record create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDnsRecord {
    pub record_type: String,
    pub name: String,
    pub data: String,
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKey {
    pub id: u64,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
}

/// The cloud control plane. Every call is a synchronous
/// request/response; readiness polling is the caller's job.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn list_droplets(&self) -> DeployResult<Vec<Droplet>>;

    /// Fetch one droplet, `None` when the id is unknown.
    async fn get_droplet(&self, id: u64) -> DeployResult<Option<Droplet>>;

    /// Create a droplet and return once the provider has accepted
    /// it.
    async fn create_droplet(&self, request: &NewDroplet) -> DeployResult<Droplet>;

    async fn delete_droplet(&self, id: u64) -> DeployResult<()>;

    async fn list_dns_records(&self, domain: &str) -> DeployResult<Vec<DnsRecord>>;

    async fn create_dns_record(&self, domain: &str, record: &NewDnsRecord)
    -> DeployResult<DnsRecord>;

    /// Point an existing record at new data.
    async fn update_dns_record(&self, domain: &str, id: u64, data: &str)
    -> DeployResult<DnsRecord>;

    async fn delete_dns_record(&self, domain: &str, id: u64) -> DeployResult<()>;

    async fn list_ssh_keys(&self) -> DeployResult<Vec<SshKey>>;

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> DeployResult<SshKey>;

    async fn delete_ssh_key(&self, id: u64) -> DeployResult<()>;
}
