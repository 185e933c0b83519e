//! Create-or-reuse reconciliation of the droplet and its A record.
//!
//! Observed provider state is the only source of truth. Each call
//! lists what exists under the deployment's derived name and issues
//! only the mutations needed to converge, so a second call with the
//! same inputs issues none.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::keys::KeyPair;
use crate::provider::{CloudProvider, DnsRecord, Droplet, NewDnsRecord, NewDroplet};
use crate::spec::{DEPLOY_TAG, DeploymentId, DeploymentSpec};

/// TTL for records this crate creates.
pub const DNS_TTL: u32 = 300;

/// What a reconciliation step had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct InstanceReconciliation {
    pub instance: Droplet,
    pub action: Action,
    /// Other instances carrying the same name. Left running unless
    /// pruned explicitly.
    pub duplicates: Vec<Droplet>,
}

#[derive(Debug, Clone)]
pub struct DnsReconciliation {
    pub record: DnsRecord,
    pub action: Action,
    /// Conflicting A records for the same name that were removed.
    pub removed: Vec<DnsRecord>,
}

pub struct ResourceReconciler {
    provider: Arc<dyn CloudProvider>,
}

impl ResourceReconciler {
    #[must_use]
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self { provider }
    }

    /// All instances named after the deployment, newest first.
    pub async fn find_instances(&self, id: &DeploymentId) -> DeployResult<Vec<Droplet>> {
        let name = id.instance_name();
        let mut found: Vec<Droplet> = self
            .provider
            .list_droplets()
            .await?
            .into_iter()
            .filter(|d| d.name == name)
            .collect();
        found.sort_by_key(|d| Reverse((d.created_at, d.id)));
        Ok(found)
    }

    /// Return the deployment's instance, creating it only when none
    /// exists.
    ///
    /// With several same-named instances the newest one is used and
    /// the others are reported in `duplicates`.
    pub async fn ensure_compute_instance(
        &self,
        spec: &DeploymentSpec,
        key: &KeyPair,
    ) -> DeployResult<InstanceReconciliation> {
        let mut found = self.find_instances(&spec.id()).await?;

        if found.is_empty() {
            let request = NewDroplet {
                name: spec.instance_name(),
                region: spec.region.clone(),
                size: spec.size.clone(),
                image: spec.image.clone(),
                ssh_key_ids: vec![key.provider_id],
                tags: vec![DEPLOY_TAG.to_string(), spec.id().key_tag()],
            };
            let instance = self.provider.create_droplet(&request).await?;
            info!(name = %instance.name, id = instance.id, "instance created");
            return Ok(InstanceReconciliation {
                instance,
                action: Action::Created,
                duplicates: Vec::new(),
            });
        }

        let instance = found.remove(0);
        if found.is_empty() {
            info!(name = %instance.name, id = instance.id, "instance exists, reusing");
        } else {
            let ids: Vec<u64> = found.iter().map(|d| d.id).collect();
            warn!(
                name = %instance.name,
                kept = instance.id,
                duplicates = ?ids,
                "several instances share the deployment name, keeping the newest"
            );
        }

        Ok(InstanceReconciliation {
            instance,
            action: Action::Unchanged,
            duplicates: found,
        })
    }

    /// Delete instances flagged as duplicates.
    pub async fn prune(&self, duplicates: &[Droplet]) -> DeployResult<()> {
        for dup in duplicates {
            info!(name = %dup.name, id = dup.id, "deleting duplicate instance");
            self.provider.delete_droplet(dup.id).await?;
        }
        Ok(())
    }

    /// Make `<subdomain>.<domain>` resolve to the instance's public
    /// IPv4 through exactly one A record.
    pub async fn ensure_dns_record(
        &self,
        instance: &Droplet,
        spec: &DeploymentSpec,
    ) -> DeployResult<DnsReconciliation> {
        let ip = instance.public_ipv4.as_deref().ok_or_else(|| {
            DeployError::provider(
                "ensure dns record",
                format!("instance {} has no public IPv4 address", instance.id),
            )
        })?;

        let mut records = self.a_records(&spec.id()).await?;

        let keep = records.iter().position(|r| r.data == ip);
        let (record, action) = if let Some(index) = keep {
            let record = records.remove(index);
            debug!(record = record.id, ip, "A record already points at the instance");
            (record, Action::Unchanged)
        } else if records.is_empty() {
            let new = NewDnsRecord {
                record_type: "A".to_string(),
                name: spec.subdomain.clone(),
                data: ip.to_string(),
                ttl: DNS_TTL,
            };
            let record = self.provider.create_dns_record(&spec.domain, &new).await?;
            info!(fqdn = %spec.fqdn(), ip, "A record created");
            (record, Action::Created)
        } else {
            let stale = records.remove(0);
            let record = self
                .provider
                .update_dns_record(&spec.domain, stale.id, ip)
                .await?;
            info!(fqdn = %spec.fqdn(), from = %stale.data, to = ip, "A record updated");
            (record, Action::Updated)
        };

        for extra in &records {
            warn!(record = extra.id, data = %extra.data, "removing conflicting A record");
            self.provider.delete_dns_record(&spec.domain, extra.id).await?;
        }

        Ok(DnsReconciliation {
            record,
            action,
            removed: records,
        })
    }

    /// A records for the deployment's subdomain.
    pub async fn a_records(&self, id: &DeploymentId) -> DeployResult<Vec<DnsRecord>> {
        Ok(self
            .provider
            .list_dns_records(&id.domain)
            .await?
            .into_iter()
            .filter(|r| r.record_type == "A" && r.name == id.subdomain)
            .collect())
    }
}
