#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::DateTime;
use n8n_deploy::error::{DeployError, DeployResult};
use n8n_deploy::keys::{KeyGenerator, KeyStore};
use n8n_deploy::provider::{
    CloudProvider, DnsRecord, Droplet, DropletStatus, NewDnsRecord, NewDroplet, SshKey,
};
use n8n_deploy::remote::{CommandOutput, RemoteExecutor, RemoteHost};
use n8n_deploy::verify::HealthProbe;
use n8n_deploy::{Pipeline, Settings};

/// Fingerprint the fakes agree on for a public key line.
pub fn fingerprint_of(public_key: &str) -> String {
    format!("fp:{}", public_key.trim())
}

pub fn droplet(id: u64, name: &str, ip: Option<&str>, created: i64) -> Droplet {
    Droplet {
        id,
        name: name.to_string(),
        status: DropletStatus::Active,
        public_ipv4: ip.map(str::to_string),
        created_at: DateTime::from_timestamp(created, 0),
        tags: Vec::new(),
    }
}

pub fn a_record(id: u64, name: &str, data: &str) -> DnsRecord {
    DnsRecord {
        id,
        record_type: "A".to_string(),
        name: name.to_string(),
        data: data.to_string(),
        ttl: 300,
    }
}

#[derive(Debug, Default)]
pub struct CloudState {
    pub droplets: Vec<Droplet>,
    pub records: Vec<(String, DnsRecord)>,
    pub keys: Vec<SshKey>,
    pub next_id: u64,
    /// `get_droplet` calls answered with `Provisioning` before a new
    /// droplet turns active.
    pub boot_polls: u32,
    pub pending_polls: u32,
    pub droplet_creates: usize,
    pub droplet_deletes: usize,
    pub dns_creates: usize,
    pub dns_updates: usize,
    pub dns_deletes: usize,
    pub key_creates: usize,
    pub key_deletes: usize,
    pub get_calls: usize,
    /// The next `create_ssh_key` finds the same public key already
    /// registered by someone else.
    pub concurrent_key_registration: bool,
}

impl CloudState {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn mutations(&self) -> usize {
        self.droplet_creates
            + self.droplet_deletes
            + self.dns_creates
            + self.dns_updates
            + self.dns_deletes
            + self.key_creates
            + self.key_deletes
    }
}

/// In-memory provider recording every mutation.
#[derive(Debug, Default)]
pub struct FakeCloud {
    pub state: Mutex<CloudState>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn booting(polls: u32) -> Arc<Self> {
        let cloud = Self::default();
        cloud.state.lock().unwrap().boot_polls = polls;
        Arc::new(cloud)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut CloudState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    async fn list_droplets(&self) -> DeployResult<Vec<Droplet>> {
        Ok(self.with(|s| s.droplets.clone()))
    }

    async fn get_droplet(&self, id: u64) -> DeployResult<Option<Droplet>> {
        Ok(self.with(|s| {
            s.get_calls += 1;
            let pending = s.pending_polls;
            let droplet = s.droplets.iter_mut().find(|d| d.id == id)?;
            if droplet.status == DropletStatus::Provisioning {
                if pending == 0 {
                    droplet.status = DropletStatus::Active;
                    droplet.public_ipv4 = Some(format!("203.0.113.{id}"));
                } else {
                    s.pending_polls -= 1;
                    return Some(droplet.clone());
                }
            }
            Some(droplet.clone())
        }))
    }

    async fn create_droplet(&self, request: &NewDroplet) -> DeployResult<Droplet> {
        Ok(self.with(|s| {
            s.droplet_creates += 1;
            let id = s.next();
            s.pending_polls = s.boot_polls;
            let droplet = Droplet {
                id,
                name: request.name.clone(),
                status: DropletStatus::Provisioning,
                public_ipv4: None,
                created_at: DateTime::from_timestamp(1_700_000_000 + i64::try_from(id).unwrap(), 0),
                tags: request.tags.clone(),
            };
            s.droplets.push(droplet.clone());
            droplet
        }))
    }

    async fn delete_droplet(&self, id: u64) -> DeployResult<()> {
        self.with(|s| {
            s.droplet_deletes += 1;
            s.droplets.retain(|d| d.id != id);
        });
        Ok(())
    }

    async fn list_dns_records(&self, domain: &str) -> DeployResult<Vec<DnsRecord>> {
        Ok(self.with(|s| {
            s.records
                .iter()
                .filter(|(d, _)| d == domain)
                .map(|(_, r)| r.clone())
                .collect()
        }))
    }

    async fn create_dns_record(
        &self,
        domain: &str,
        record: &NewDnsRecord,
    ) -> DeployResult<DnsRecord> {
        Ok(self.with(|s| {
            s.dns_creates += 1;
            let created = DnsRecord {
                id: s.next(),
                record_type: record.record_type.clone(),
                name: record.name.clone(),
                data: record.data.clone(),
                ttl: record.ttl,
            };
            s.records.push((domain.to_string(), created.clone()));
            created
        }))
    }

    async fn update_dns_record(&self, domain: &str, id: u64, data: &str) -> DeployResult<DnsRecord> {
        self.with(|s| {
            s.dns_updates += 1;
            let (_, record) = s
                .records
                .iter_mut()
                .find(|(d, r)| d == domain && r.id == id)
                .ok_or_else(|| DeployError::provider("update dns record", "not found"))?;
            record.data = data.to_string();
            Ok(record.clone())
        })
    }

    async fn delete_dns_record(&self, domain: &str, id: u64) -> DeployResult<()> {
        self.with(|s| {
            s.dns_deletes += 1;
            s.records.retain(|(d, r)| !(d == domain && r.id == id));
        });
        Ok(())
    }

    async fn list_ssh_keys(&self) -> DeployResult<Vec<SshKey>> {
        Ok(self.with(|s| s.keys.clone()))
    }

    async fn create_ssh_key(&self, name: &str, public_key: &str) -> DeployResult<SshKey> {
        self.with(|s| {
            let fingerprint = fingerprint_of(public_key);
            if std::mem::take(&mut s.concurrent_key_registration) {
                let id = s.next();
                s.keys.push(SshKey {
                    id,
                    name: "registered-concurrently".to_string(),
                    fingerprint: fingerprint.clone(),
                    public_key: public_key.to_string(),
                });
            }
            if s.keys.iter().any(|k| k.fingerprint == fingerprint) {
                return Err(DeployError::provider(
                    "create ssh key",
                    "SSH Key is already in use on your account",
                ));
            }
            s.key_creates += 1;
            let key = SshKey {
                id: s.next(),
                name: name.to_string(),
                fingerprint,
                public_key: public_key.to_string(),
            };
            s.keys.push(key.clone());
            Ok(key)
        })
    }

    async fn delete_ssh_key(&self, id: u64) -> DeployResult<()> {
        self.with(|s| {
            s.key_deletes += 1;
            s.keys.retain(|k| k.id != id);
        });
        Ok(())
    }
}

/// Writes a unique fake public key per generation.
#[derive(Debug, Default)]
pub struct FakeKeygen {
    pub generated: AtomicUsize,
}

#[async_trait]
impl KeyGenerator for FakeKeygen {
    async fn generate(&self, path: &Path, comment: &str) -> DeployResult<()> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
        std::fs::write(path, format!("PRIVATE {n}\n"))?;
        let mut public = path.as_os_str().to_owned();
        public.push(".pub");
        std::fs::write(public, format!("ssh-ed25519 FAKEKEY{n} {comment}\n"))?;
        Ok(())
    }

    async fn fingerprint(&self, public_key_path: &Path) -> DeployResult<String> {
        Ok(fingerprint_of(&std::fs::read_to_string(public_key_path)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: String,
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// Remote host that records every command and file write.
#[derive(Debug, Default)]
pub struct FakeRemote {
    pub commands: Mutex<Vec<Vec<String>>>,
    pub files: Mutex<Vec<WrittenFile>>,
    /// SSH probes that fail before the host answers.
    pub unreachable_for: AtomicU32,
    pub never_reachable: bool,
    /// Docker is absent until the install script runs.
    pub missing_runtime: AtomicBool,
    /// Docker is installed but the compose plugin is not.
    pub missing_compose: AtomicBool,
    /// First argv element of a command that exits non-zero.
    pub failing: Option<String>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<WrittenFile> {
        self.files.lock().unwrap().clone()
    }

    pub fn probes(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.first().is_some_and(|p| p == "echo"))
            .count()
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn exec(&self, host: &RemoteHost, argv: &[&str]) -> DeployResult<CommandOutput> {
        self.commands
            .lock()
            .unwrap()
            .push(argv.iter().map(|s| (*s).to_string()).collect());

        if argv.first() == Some(&"echo") {
            if self.never_reachable {
                return Err(DeployError::SshFailed(format!("{host}: Connection refused")));
            }
            let left = self.unreachable_for.load(Ordering::SeqCst);
            if left > 0 {
                self.unreachable_for.store(left - 1, Ordering::SeqCst);
                return Err(DeployError::SshFailed(format!("{host}: Connection refused")));
            }
        }

        let script = if argv.first() == Some(&"sh") { argv.get(2).copied() } else { None };
        if script.is_some_and(|s| s.contains("get.docker.com")) {
            self.missing_runtime.store(false, Ordering::SeqCst);
            self.missing_compose.store(false, Ordering::SeqCst);
        }
        if script.is_some_and(|s| s.contains("docker-compose-v2")) {
            self.missing_compose.store(false, Ordering::SeqCst);
        }

        let no_docker = self.missing_runtime.load(Ordering::SeqCst);
        if script == Some("command -v docker") && no_docker {
            return Ok(CommandOutput {
                code: 1,
                stdout: String::new(),
                stderr: String::new(),
            });
        }
        if argv == ["docker", "compose", "version"]
            && (no_docker || self.missing_compose.load(Ordering::SeqCst))
        {
            return Ok(CommandOutput {
                code: if no_docker { 127 } else { 125 },
                stdout: String::new(),
                stderr: if no_docker {
                    "docker: not found".to_string()
                } else {
                    "docker: 'compose' is not a docker command.".to_string()
                },
            });
        }

        if self.failing.as_deref() == argv.first().copied() {
            return Ok(CommandOutput {
                code: 1,
                stdout: String::new(),
                stderr: "boom".to_string(),
            });
        }

        Ok(CommandOutput {
            code: 0,
            stdout: "ok\n".to_string(),
            stderr: String::new(),
        })
    }

    async fn write_file(
        &self,
        _host: &RemoteHost,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> DeployResult<()> {
        self.files.lock().unwrap().push(WrittenFile {
            path: path.to_string(),
            contents: contents.to_vec(),
            mode,
        });
        Ok(())
    }
}

/// Answers health probes from a script, then with `fallback`.
#[derive(Debug)]
pub struct FakeProbe {
    pub script: Mutex<VecDeque<u16>>,
    pub fallback: u16,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn healthy() -> Arc<Self> {
        Self::scripted(&[], 200)
    }

    pub fn scripted(statuses: &[u16], fallback: u16) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(statuses.iter().copied().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, _url: &str) -> DeployResult<u16> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback))
    }
}

/// Fast settings for tests running on paused time.
pub fn test_settings() -> Settings {
    Settings {
        active_poll_interval: 1,
        ssh_initial_delay: 1,
        ssh_max_delay: 8,
        health_retry_delay: 1,
        ..Settings::default()
    }
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub remote: Arc<FakeRemote>,
    pub probe: Arc<FakeProbe>,
    pub keygen: Arc<FakeKeygen>,
    pub keys_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            cloud: FakeCloud::new(),
            remote: FakeRemote::new(),
            probe: FakeProbe::healthy(),
            keygen: Arc::new(FakeKeygen::default()),
            keys_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn store(&self) -> KeyStore {
        KeyStore::new(self.keys_dir.path())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.cloud.clone(),
            self.remote.clone(),
            self.probe.clone(),
            self.keygen.clone(),
            self.store(),
        )
        .settings(test_settings())
    }
}
