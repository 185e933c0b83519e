use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "n8n-deploy")]
#[command(about = "Deploy n8n with PostgreSQL and Caddy to a DigitalOcean droplet")]
#[command(version)]
pub struct Cli {
    /// Deployment configuration file
    #[arg(short, long, global = true, default_value = "n8n-deploy.yaml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or converge the deployment and print its URL
    Deploy {
        /// Generate and register a fresh SSH key
        #[arg(long)]
        rotate_key: bool,
    },

    /// Delete the deployment's droplet and DNS record
    Destroy {
        /// Also delete the deployment SSH key
        #[arg(long)]
        delete_key: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the deployment's droplet
    Status {
        /// Also list containers on the droplet
        #[arg(long)]
        containers: bool,
    },

    /// Print the files a deploy would write, without changing anything
    Render,
}
