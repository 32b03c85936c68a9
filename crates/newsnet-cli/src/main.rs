//! `newsnet` binary

mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;

use newsnet_core::PostId;
use newsnet_distribution::{
    DistributeOptions, DistributorMigrator, MigrateOptions, MigrationTarget, OutgoingPost,
    other_network_sites,
};
use newsnet_logging::SubscriberBuilder;
use newsnet_server::{App, NetworkConfig};
use newsnet_storage::EventQuery;
use newsnet_sync::HttpLinkTransport;

use crate::cli::{Cli, Command, DistributeCommand, DistributorCommand, MigrateArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = NetworkConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let _guard = SubscriberBuilder::new()
        .with_config(config.logging.clone())
        .init();

    let app = App::open(config).await?;

    match cli.command {
        Command::Serve => serve(app).await?,
        Command::Pull => pull(&app).await?,
        Command::Distribute {
            command:
                DistributeCommand::Post {
                    post_id,
                    sites,
                    status_on_create,
                },
        } => {
            let options = DistributeOptions { status_on_create };
            distribute(&app, PostId(post_id), sites, options).await?
        }
        Command::Distributor {
            command: DistributorCommand::Migrate(args),
        } => migrate(&app, args).await?,
        Command::Events { after, limit } => events(&app, after, limit)?,
    }

    Ok(())
}

async fn serve(app: App) -> anyhow::Result<()> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            let _ = signal_tx.send(());
        }
    });

    app.serve(shutdown_tx).await?;
    Ok(())
}

async fn pull(app: &App) -> anyhow::Result<()> {
    let Some(puller) = app.puller() else {
        bail!("pull runs on nodes only");
    };
    if let Some(outbox) = app.outbox() {
        let flushed = outbox.flush(puller.client().as_ref()).await?;
        println!("{}", serde_json::to_string_pretty(&flushed)?);
    }
    let report = puller.pull().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn distribute(
    app: &App,
    post_id: PostId,
    sites: Vec<String>,
    options: DistributeOptions,
) -> anyhow::Result<()> {
    let site = app.site().as_ref();
    let sites = if sites.len() == 1 && sites[0] == "all" {
        other_network_sites(site)?
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        sites
    };

    let payload =
        OutgoingPost::new(site, post_id)?.distribute(&sites, app.sink().as_ref(), &options)?;
    for url in &payload.sites {
        println!("{url}");
    }

    // A Node sends right away rather than waiting for the next pull
    if let (Some(outbox), Some(puller)) = (app.outbox(), app.puller()) {
        outbox.flush(puller.client().as_ref()).await?;
    }
    Ok(())
}

async fn migrate(app: &App, args: MigrateArgs) -> anyhow::Result<()> {
    let config = app.config();
    let mut transport = HttpLinkTransport::new(config.http_timeout())?;
    if let Some(token) = &config.api_token {
        transport = transport.with_token(token);
    }

    let target = match args.post_id {
        Some(id) => MigrationTarget::Post(PostId(id)),
        None => MigrationTarget::All,
    };
    let options = MigrateOptions {
        target,
        batch_size: args.batch_size,
        strict: args.strict,
        delete: args.delete,
        dry_run: args.dry_run,
    };

    let report = DistributorMigrator::new(app.site().as_ref(), &transport)
        .migrate(&options)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.aborted {
        bail!("migration stopped at the first failure");
    }
    Ok(())
}

fn events(app: &App, after: u64, limit: usize) -> anyhow::Result<()> {
    let Some(hub) = app.hub() else {
        bail!("the event log lives on the hub");
    };
    let events = hub
        .log()
        .read(&EventQuery::after(after).with_limit(limit))?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
