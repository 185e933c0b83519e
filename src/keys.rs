//! SSH key pairs used to reach the provisioned host.
//!
//! The private half lives only on the machine running the
//! deployment, under [`KeyStore`]. The provider only ever sees the
//! public half, registered under a stable name derived from the
//! deployment. Before anything is generated or registered the
//! provider's key list is searched by fingerprint, so repeated runs
//! reuse one registration instead of piling up new keys.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cmd;
use crate::error::{DeployError, DeployResult};
use crate::provider::{CloudProvider, SshKey};

/// Creates key pairs and computes the fingerprint format the
/// provider reports.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Write a new private key to `path` and the public half to
    /// `path.pub`.
    async fn generate(&self, path: &Path, comment: &str) -> DeployResult<()>;

    /// MD5 fingerprint of a public key file as colon-separated hex.
    async fn fingerprint(&self, public_key_path: &Path) -> DeployResult<String>;
}

/// Ed25519 keys via the local `ssh-keygen`.
#[derive(Debug, Clone, Default)]
pub struct SshKeygen;

#[async_trait]
impl KeyGenerator for SshKeygen {
    async fn generate(&self, path: &Path, comment: &str) -> DeployResult<()> {
        let path = path.to_string_lossy();
        cmd::run(
            "ssh-keygen",
            &["-q", "-t", "ed25519", "-N", "", "-C", comment, "-f", &path],
        )
        .await?;
        Ok(())
    }

    async fn fingerprint(&self, public_key_path: &Path) -> DeployResult<String> {
        let path = public_key_path.to_string_lossy();
        let output = cmd::run("ssh-keygen", &["-l", "-E", "md5", "-f", &path]).await?;
        parse_md5_fingerprint(&output).ok_or_else(|| {
            DeployError::Other(format!("unexpected ssh-keygen output for {path}"))
        })
    }
}

/// Extract `aa:bb:...` from `ssh-keygen -l -E md5` output.
#[must_use]
pub fn parse_md5_fingerprint(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .nth(1)
        .and_then(|fp| fp.strip_prefix("MD5:"))
        .map(String::from)
}

/// Location of a private key on the local disk. Only the path is
/// ever printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    path: PathBuf,
}

impl PrivateKey {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.path.display())
    }
}

/// A key pair whose public half is registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub name: String,
    pub provider_id: u64,
    pub public_key: String,
    pub fingerprint: String,
    pub private_key: PrivateKey,
}

impl KeyPair {
    fn from_registration(key: &SshKey, local: &LocalKey) -> Self {
        Self {
            name: key.name.clone(),
            provider_id: key.id,
            public_key: local.public_key.clone(),
            fingerprint: key.fingerprint.clone(),
            private_key: PrivateKey::new(&local.private_path),
        }
    }
}

/// A key pair found on local disk.
#[derive(Debug, Clone)]
pub struct LocalKey {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
    pub public_key: String,
}

/// Directory of locally persisted key pairs, one `<name>` and
/// `<name>.pub` per deployment.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn private_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    #[must_use]
    pub fn public_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.pub"))
    }

    /// Load a key pair, `None` unless both halves exist.
    pub fn load(&self, name: &str) -> DeployResult<Option<LocalKey>> {
        let private_path = self.private_path(name);
        let public_path = self.public_path(name);
        if !private_path.exists() || !public_path.exists() {
            return Ok(None);
        }
        let public_key = std::fs::read_to_string(&public_path)?.trim().to_string();
        Ok(Some(LocalKey {
            private_path,
            public_path,
            public_key,
        }))
    }

    /// Remove both halves. Missing files are fine.
    pub fn remove(&self, name: &str) -> DeployResult<()> {
        for path in [self.private_path(name), self.public_path(name)] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed local key file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Create the key directory owner-only. An existing directory is
    /// left as it is.
    fn prepare(&self) -> DeployResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

/// Looks up, generates and registers deployment keys.
pub struct KeyManager {
    provider: Arc<dyn CloudProvider>,
    generator: Arc<dyn KeyGenerator>,
    store: KeyStore,
}

impl KeyManager {
    #[must_use]
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        generator: Arc<dyn KeyGenerator>,
        store: KeyStore,
    ) -> Self {
        Self {
            provider,
            generator,
            store,
        }
    }

    /// Return a registered key pair for `name`, creating or
    /// registering only what is missing.
    ///
    /// A local key already registered (under any name) is reused
    /// as is. A provider key holding `name` without a matching local
    /// private key is useless for SSH and is replaced. With `rotate`
    /// a fresh pair is always generated and replaces the old
    /// registration.
    pub async fn ensure_key_pair(&self, name: &str, rotate: bool) -> DeployResult<KeyPair> {
        let registered = self.provider.list_ssh_keys().await?;

        if rotate {
            info!(key = name, "rotating SSH key");
            self.store.remove(name)?;
        }
        let local = match self.store.load(name)? {
            Some(local) => local,
            None => self.generate(name).await?,
        };
        let fingerprint = self.generator.fingerprint(&local.public_path).await?;

        if let Some(existing) = registered.iter().find(|k| k.fingerprint == fingerprint) {
            if existing.name == name {
                info!(key = name, id = existing.id, "reusing registered SSH key");
            } else {
                info!(
                    key = name,
                    registered_as = %existing.name,
                    id = existing.id,
                    "local key already registered under another name, reusing it"
                );
            }
            return Ok(KeyPair::from_registration(existing, &local));
        }

        for stale in registered.iter().filter(|k| k.name == name) {
            warn!(
                key = name,
                id = stale.id,
                fingerprint = %stale.fingerprint,
                "registered key has no local private half, replacing it"
            );
            self.provider.delete_ssh_key(stale.id).await?;
        }

        match self.provider.create_ssh_key(name, &local.public_key).await {
            Ok(created) => {
                info!(key = name, id = created.id, "registered SSH key");
                let mut pair = KeyPair::from_registration(&created, &local);
                if pair.fingerprint.is_empty() {
                    pair.fingerprint = fingerprint;
                }
                Ok(pair)
            }
            Err(err) => {
                // Lost a race with a concurrent run registering the
                // same public key: prefer the existing registration.
                let existing = self
                    .provider
                    .list_ssh_keys()
                    .await?
                    .into_iter()
                    .find(|k| k.fingerprint == fingerprint);
                match existing {
                    Some(key) => {
                        warn!(key = name, id = key.id, "key registered concurrently, reusing it");
                        Ok(KeyPair::from_registration(&key, &local))
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Delete the provider registration and local files for `name`.
    /// Returns the number of provider keys removed.
    pub async fn remove_key(&self, name: &str) -> DeployResult<usize> {
        let mut removed = 0;
        for key in self
            .provider
            .list_ssh_keys()
            .await?
            .into_iter()
            .filter(|k| k.name == name)
        {
            info!(key = name, id = key.id, "deleting SSH key");
            self.provider.delete_ssh_key(key.id).await?;
            removed += 1;
        }
        self.store.remove(name)?;
        Ok(removed)
    }

    async fn generate(&self, name: &str) -> DeployResult<LocalKey> {
        self.store.prepare()?;
        let path = self.store.private_path(name);
        info!(key = name, path = %path.display(), "generating SSH key pair");
        self.generator.generate(&path, name).await?;
        self.store.load(name)?.ok_or_else(|| {
            DeployError::Other(format!("key generation did not produce {}", path.display()))
        })
    }
}
