//! n8n-deploy command-line entrypoint.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use n8n_deploy::cli::{Cli, Command};
use n8n_deploy::{
    DeployConfig, DigitalOcean, HttpProbe, KeyStore, Pipeline, SshKeygen, SshSession,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("ignoring .env: {e}");
        }
    }

    let config = DeployConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let spec = config.deployment;

    if matches!(cli.command, Command::Render) {
        for file in Pipeline::render(&spec)? {
            eprintln!("--- {} ({:o}) ---", file.path, file.mode);
            println!("{}", file.contents);
        }
        return Ok(());
    }

    let provider = DigitalOcean::new();
    provider.check_prerequisites().await?;

    let store = KeyStore::new(config.settings.key_dir()?);
    let pipeline = Pipeline::new(
        Arc::new(provider),
        Arc::new(SshSession::new()),
        Arc::new(HttpProbe::new()?),
        Arc::new(SshKeygen),
        store,
    )
    .settings(config.settings);

    match cli.command {
        Command::Deploy { rotate_key } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, stopping");
                    on_signal.cancel();
                }
            });

            let url = pipeline.rotate_key(rotate_key).deploy(&spec, cancel).await?;
            println!("{url}");
        }
        Command::Destroy { delete_key, yes } => {
            let id = spec.id();
            let what = format!("droplet '{}' and DNS record {}", id.instance_name(), id.fqdn());
            if !yes && !confirm(&what)? {
                eprintln!("Aborted.");
                return Ok(());
            }
            pipeline.destroy(&id, delete_key).await?;
            eprintln!("Cleanup complete!");
        }
        Command::Status { containers } => {
            let droplet = pipeline.status(&spec.id()).await?;
            println!("{}", serde_json::to_string_pretty(&droplet)?);
            if containers {
                println!("{}", pipeline.stack_status(&spec).await?);
            }
        }
        Command::Render => {}
    }

    Ok(())
}

fn confirm(what: &str) -> anyhow::Result<bool> {
    eprintln!("WARNING: This will permanently delete {what}");
    eprint!("Are you sure? Type 'yes' to confirm: ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}
