mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tinylink_generator::RandomGenerator;
use tinylink_shortener::{BatchEntry, ExpirationPolicy, ShortenParams, ShortenerConfig, ShortenerService};
use tinylink_storage::Storage;
use tracing::info;

type Service = ShortenerService<Storage, RandomGenerator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();

    tinylink_telemetry::init(config.log_format.into())?;

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        snapshot = ?config.file_storage_path,
        "starting tinylink"
    );

    let storage = Storage::open(config.storage_config()?)
        .await
        .context("failed to open storage")?;
    let service = ShortenerService::new(
        storage,
        RandomGenerator::default(),
        ShortenerConfig::builder().base_url(config.base_url).build(),
    );

    let outcome = run(&service, config.command).await;
    service.close().await;
    outcome
}

async fn run(service: &Service, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten {
            url,
            owner,
            expire_in,
        } => {
            let expiration = expire_in
                .map(|secs| ExpirationPolicy::AfterDuration(Duration::from_secs(secs)))
                .unwrap_or_default();
            let shortened = service
                .shorten(
                    ShortenParams::builder()
                        .original_url(url)
                        .owner_id(owner)
                        .expiration(expiration)
                        .build(),
                )
                .await?;

            if shortened.created {
                println!("{}", shortened.short_url);
            } else {
                println!("{} (already shortened)", shortened.short_url);
            }
        }
        Command::ShortenBatch { urls, owner } => {
            let entries = urls
                .into_iter()
                .enumerate()
                .map(|(index, url)| BatchEntry::new(index.to_string(), url))
                .collect();

            for result in service.shorten_batch(entries, &owner).await? {
                println!("{}\t{}", result.correlation_id, result.short_url);
            }
        }
        Command::Resolve { alias } => {
            println!("{}", service.resolve(&alias).await?);
        }
        Command::List { owner } => {
            for link in service.links_by_owner(&owner).await? {
                println!("{}\t{}", link.short_url, link.original_url);
            }
        }
        Command::Delete { owner, aliases } => {
            let count = aliases.len();
            service.delete(aliases, &owner).await?;
            info!(count, owner_id = %owner, "delete request applied");
        }
        Command::Stats => {
            let stats = service.stats().await?;
            println!("urls: {}", stats.urls);
            println!("owners: {}", stats.owners);
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}
