//! Idempotent n8n deployments on DigitalOcean.
//!
//! `n8n-deploy` takes one [`DeploymentSpec`] and converges a single
//! droplet running n8n, PostgreSQL and Caddy behind
//! `https://<subdomain>.<domain>`. Every run re-derives state from the
//! provider by deterministic names, so running it twice creates
//! nothing new the second time.
//!
//! # Overview
//!
//! A [`Pipeline`] wires together:
//!
//! - a [`CloudProvider`](provider::CloudProvider) for droplets, DNS
//!   and SSH keys (e.g. [`DigitalOcean`], driving `doctl`)
//! - a [`RemoteExecutor`](remote::RemoteExecutor) for commands and
//!   file writes on the droplet (e.g. [`SshSession`])
//! - a [`HealthProbe`](verify::HealthProbe) for the final check (e.g.
//!   [`HttpProbe`])
//! - a [`KeyGenerator`](keys::KeyGenerator) and [`KeyStore`] for the
//!   deployment key
//!
//! # Stages
//!
//! 1. **Keys** - reuse the registered deployment key or generate and
//!    register one
//! 2. **Instance** - find the droplet by name or create it
//! 3. **Readiness** - wait until it is active
//! 4. **DNS** - point exactly one A record at it
//! 5. **Readiness** - wait until SSH answers
//! 6. **Configure** - write `docker-compose.yml`, `Caddyfile` and
//!    `.env`, install Docker, start the stack
//! 7. **Verify** - poll `https://<fqdn>/healthz`
//!
//! The first failing stage ends the run with
//! [`DeployError::Stage`](error::DeployError::Stage). Nothing is
//! rolled back; use [`Pipeline::destroy`] to tear down.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use n8n_deploy::{
//!     DeploymentSpec, DigitalOcean, HttpProbe, KeyStore, Pipeline, SshKeygen, SshSession,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let spec = DeploymentSpec::new("example.com", "n8n")
//!     .database("n8n", "change-me", "n8n")
//!     .encryption_key("also-change-me")
//!     .acme_email("ops@example.com");
//!
//! let pipeline = Pipeline::new(
//!     Arc::new(DigitalOcean::new()),
//!     Arc::new(SshSession::new()),
//!     Arc::new(HttpProbe::new()?),
//!     Arc::new(SshKeygen),
//!     KeyStore::new("/home/me/.ssh"),
//! );
//!
//! let url = pipeline.deploy(&spec, CancellationToken::new()).await?;
//! assert_eq!(url, "https://n8n.example.com");
//! # Ok(())
//! # }
//! ```

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod poller;
pub mod provider;
pub mod reconcile;
pub mod remote;
pub mod render;
pub mod spec;
pub mod verify;

pub use config::{DeployConfig, Settings};
pub use context::RunContext;
pub use error::{DeployError, DeployResult, Stage};
pub use keys::{KeyStore, SshKeygen};
pub use pipeline::Pipeline;
pub use provider::digitalocean::DigitalOcean;
pub use remote::ssh::SshSession;
pub use spec::{DeploymentId, DeploymentSpec};
pub use verify::HttpProbe;

/// The compute instance a deployment runs on.
pub type ComputeInstance = provider::Droplet;
