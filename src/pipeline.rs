use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::context::RunContext;
use crate::error::{DeployError, DeployResult, Stage, StageExt};
use crate::keys::{KeyGenerator, KeyManager, KeyStore, PrivateKey};
use crate::poller::{Backoff, ReadinessPoller};
use crate::provider::{CloudProvider, Droplet};
use crate::reconcile::ResourceReconciler;
use crate::remote::configure::RemoteConfigurator;
use crate::remote::{RemoteExecutor, RemoteHost};
use crate::render::{self, RenderedFile};
use crate::spec::{DeploymentId, DeploymentSpec};
use crate::verify::{HealthProbe, Verifier};

/// Deployment pipeline reconciling keys, the instance, DNS and the
/// remote stack for one n8n deployment.
pub struct Pipeline {
    provider: Arc<dyn CloudProvider>,
    remote: Arc<dyn RemoteExecutor>,
    probe: Arc<dyn HealthProbe>,
    generator: Arc<dyn KeyGenerator>,
    store: KeyStore,
    settings: Settings,
    rotate_key: bool,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        remote: Arc<dyn RemoteExecutor>,
        probe: Arc<dyn HealthProbe>,
        generator: Arc<dyn KeyGenerator>,
        store: KeyStore,
    ) -> Self {
        Self {
            provider,
            remote,
            probe,
            generator,
            store,
            settings: Settings::default(),
            rotate_key: false,
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Generate and register a fresh deployment key on the next
    /// `deploy`.
    #[must_use]
    pub const fn rotate_key(mut self, rotate: bool) -> Self {
        self.rotate_key = rotate;
        self
    }

    fn keys(&self) -> KeyManager {
        KeyManager::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.generator),
            self.store.clone(),
        )
    }

    fn reconciler(&self) -> ResourceReconciler {
        ResourceReconciler::new(Arc::clone(&self.provider))
    }

    fn context(&self, cancel: CancellationToken) -> RunContext {
        let ctx = RunContext::new(cancel);
        match self.settings.deadline() {
            Some(deadline) => ctx.with_timeout(deadline),
            None => ctx,
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.settings.ssh_initial_delay(),
            self.settings.ssh_max_delay(),
            self.settings.ssh_max_attempts,
        )
    }

    /// Converge the deployment and return its public URL.
    ///
    /// Stages run strictly in order and the first failure stops the
    /// run, wrapped in [`DeployError::Stage`]. Resources created
    /// before the failure are left in place.
    pub async fn deploy(
        &self,
        spec: &DeploymentSpec,
        cancel: CancellationToken,
    ) -> DeployResult<String> {
        let ctx = self.context(cancel);
        spec.validate().stage(Stage::Validate)?;
        info!(fqdn = %spec.fqdn(), instance = %spec.instance_name(), "deploying");

        let key = ctx
            .run(self.keys().ensure_key_pair(&spec.key_name(), self.rotate_key))
            .await
            .stage(Stage::Keys)?;

        let reconciler = self.reconciler();
        let reconciled = ctx
            .run(reconciler.ensure_compute_instance(spec, &key))
            .await
            .stage(Stage::Instance)?;
        if !reconciled.duplicates.is_empty() {
            if self.settings.prune_duplicates {
                ctx.run(reconciler.prune(&reconciled.duplicates))
                    .await
                    .stage(Stage::Instance)?;
            } else {
                warn!(
                    count = reconciled.duplicates.len(),
                    "duplicate instances left in place, enable prune_duplicates to delete them"
                );
            }
        }

        let poller = ReadinessPoller::new(Arc::clone(&self.provider), Arc::clone(&self.remote));
        let instance = poller
            .wait_until_active(
                &ctx,
                reconciled.instance.id,
                self.settings.active_timeout(),
                self.settings.active_poll_interval(),
            )
            .await
            .stage(Stage::Readiness)?;

        ctx.run(reconciler.ensure_dns_record(&instance, spec))
            .await
            .stage(Stage::Dns)?;

        let host = remote_host(&instance, &self.settings.ssh_user, key.private_key.clone())
            .stage(Stage::Readiness)?;
        poller
            .wait_until_ssh_reachable(&ctx, &host, self.backoff())
            .await
            .stage(Stage::Readiness)?;

        let files = render::render_all(spec).stage(Stage::Configure)?;
        let configurator = RemoteConfigurator::new(Arc::clone(&self.remote));
        ctx.run(configurator.configure_host(&host, &files))
            .await
            .stage(Stage::Configure)?;
        ctx.run(configurator.install_runtime(&host))
            .await
            .stage(Stage::Configure)?;
        ctx.run(configurator.start_stack(&host, spec.remote_dir()))
            .await
            .stage(Stage::Configure)?;

        Verifier::new(Arc::clone(&self.probe))
            .verify_healthy(
                &ctx,
                &spec.health_url(),
                self.settings.health_max_attempts,
                self.settings.health_retry_delay(),
            )
            .await
            .stage(Stage::Verify)?;

        let url = spec.url();
        info!(%url, "deployment healthy");
        Ok(url)
    }

    /// Delete every instance and A record belonging to the
    /// deployment. Absent resources are not an error, so repeating
    /// the call is safe.
    ///
    /// With `delete_key` the deployment key is removed as well,
    /// unless some other instance still carries its tag.
    pub async fn destroy(&self, id: &DeploymentId, delete_key: bool) -> DeployResult<()> {
        id.validate().stage(Stage::Validate)?;
        let reconciler = self.reconciler();

        let instances = reconciler.find_instances(id).await.stage(Stage::Teardown)?;
        if instances.is_empty() {
            info!(instance = %id.instance_name(), "no instance to delete");
        }
        for instance in &instances {
            info!(name = %instance.name, id = instance.id, "deleting instance");
            self.provider
                .delete_droplet(instance.id)
                .await
                .stage(Stage::Teardown)?;
        }

        let records = reconciler.a_records(id).await.stage(Stage::Teardown)?;
        if records.is_empty() {
            info!(fqdn = %id.fqdn(), "no A record to delete");
        }
        for record in &records {
            info!(fqdn = %id.fqdn(), record = record.id, data = %record.data, "deleting A record");
            self.provider
                .delete_dns_record(&id.domain, record.id)
                .await
                .stage(Stage::Teardown)?;
        }

        if delete_key {
            let tag = id.key_tag();
            let holders: Vec<u64> = self
                .provider
                .list_droplets()
                .await
                .stage(Stage::Teardown)?
                .into_iter()
                .filter(|d| d.tags.contains(&tag))
                .map(|d| d.id)
                .collect();
            if holders.is_empty() {
                let removed = self
                    .keys()
                    .remove_key(&id.key_name())
                    .await
                    .stage(Stage::Teardown)?;
                info!(key = %id.key_name(), removed, "deployment key deleted");
            } else {
                warn!(key = %id.key_name(), instances = ?holders, "key still in use, keeping it");
            }
        }

        Ok(())
    }

    /// Current instance of the deployment, the newest one when
    /// duplicates exist.
    pub async fn status(&self, id: &DeploymentId) -> DeployResult<Droplet> {
        id.validate()?;
        self.reconciler()
            .find_instances(id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::ServerNotFound(id.instance_name()))
    }

    /// `docker compose ps` on the deployment's instance, using the
    /// locally stored key.
    pub async fn stack_status(&self, spec: &DeploymentSpec) -> DeployResult<String> {
        let instance = self.status(&spec.id()).await?;
        let key_name = spec.key_name();
        let local = self.store.load(&key_name)?.ok_or_else(|| {
            DeployError::PrerequisiteMissing(format!(
                "no local private key {}",
                self.store.private_path(&key_name).display()
            ))
        })?;
        let host = remote_host(
            &instance,
            &self.settings.ssh_user,
            PrivateKey::new(local.private_path),
        )?;
        RemoteConfigurator::new(Arc::clone(&self.remote))
            .stack_status(&host, spec.remote_dir())
            .await
    }

    /// Files a deploy would write, without touching the provider or
    /// the host.
    pub fn render(spec: &DeploymentSpec) -> DeployResult<Vec<RenderedFile>> {
        spec.validate()?;
        render::render_all(spec)
    }
}

fn remote_host(instance: &Droplet, user: &str, key: PrivateKey) -> DeployResult<RemoteHost> {
    let ip = instance.public_ipv4.as_deref().ok_or_else(|| {
        DeployError::provider(
            "connect",
            format!("instance {} has no public IPv4 address", instance.id),
        )
    })?;
    Ok(RemoteHost::new(ip, user, key))
}
