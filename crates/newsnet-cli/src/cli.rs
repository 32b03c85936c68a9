use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use newsnet_core::PostStatus;

#[derive(Debug, Parser)]
#[command(name = "newsnet", about = "Newspack Network hub and node", version)]
pub struct Cli {
    /// Site configuration file
    #[arg(long, short, env = "NEWSNET_CONFIG", default_value = "newsnet.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the network routes (and pull on a schedule on a Node)
    Serve,

    /// Flush queued events and pull once from the Hub
    Pull,

    /// Content distribution
    Distribute {
        #[command(subcommand)]
        command: DistributeCommand,
    },

    /// Legacy Distributor subscriptions
    Distributor {
        #[command(subcommand)]
        command: DistributorCommand,
    },

    /// List events in the Hub log
    Events {
        /// Show events after this id
        #[arg(long, default_value_t = 0)]
        after: u64,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum DistributeCommand {
    /// Distribute a post to network sites
    Post {
        post_id: u64,

        /// Comma separated site URLs, or `all`
        #[arg(long, value_delimiter = ',', required = true)]
        sites: Vec<String>,

        /// Status of copies created by this distribution
        #[arg(long)]
        status_on_create: Option<PostStatus>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DistributorCommand {
    /// Link Distributor copies to network distribution
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Post to migrate
    #[arg(conflicts_with = "all", required_unless_present = "all")]
    pub post_id: Option<u64>,

    /// Migrate every post with subscriptions
    #[arg(long)]
    pub all: bool,

    /// Posts per run with --all; 0 for no limit
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    /// Stop at the first failure
    #[arg(long)]
    pub strict: bool,

    /// Remove the legacy subscriptions once linked
    #[arg(long)]
    pub delete: bool,

    #[arg(long)]
    pub dry_run: bool,
}
