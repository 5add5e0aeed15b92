//! tsdb-restore - Main entry point
//!
//! Restores a tsdb server from a backup directory.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tsdb_restore::restore::{self, RestoreOptions, Services, UnmappedShardPolicy};
use tsdb_restore::shutdown::ShutdownCoordinator;
use tsdb_restore::transfer::progress::{format_bytes, format_duration};
use tsdb_restore::utils::logger;
use tsdb_restore::{ClientConfig, HttpClient};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// API token (overrides config)
    #[arg(short, long, global = true)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    skip_verify: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore backup data from a directory
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
struct RestoreArgs {
    /// Directory holding the backup's manifests and files
    path: PathBuf,

    /// Replace all data on the server, including users and tokens
    #[arg(long)]
    full: bool,

    /// ID of the organization to restore
    #[arg(long)]
    org_id: Option<String>,

    /// Name of the organization to restore
    #[arg(long)]
    org: Option<String>,

    /// New name for the restored organization
    #[arg(long)]
    new_org: Option<String>,

    /// ID of the bucket to restore
    #[arg(long)]
    bucket_id: Option<String>,

    /// Name of the bucket to restore
    #[arg(long)]
    bucket: Option<String>,

    /// New name for the restored bucket
    #[arg(long)]
    new_bucket: Option<String>,

    /// Keep restoring a bucket's other shards when one has no server catalog entry
    #[arg(long)]
    skip_unmapped_shards: bool,
}

impl RestoreArgs {
    fn into_options(self) -> tsdb_restore::Result<RestoreOptions> {
        Ok(RestoreOptions {
            org_id: RestoreOptions::parse_id("org-id", self.org_id.as_deref())?,
            bucket_id: RestoreOptions::parse_id("bucket-id", self.bucket_id.as_deref())?,
            path: self.path,
            full: self.full,
            org_name: self.org,
            new_org_name: self.new_org,
            bucket_name: self.bucket,
            new_bucket_name: self.new_bucket,
            unmapped_shards: if self.skip_unmapped_shards {
                UnmappedShardPolicy::SkipShard
            } else {
                UnmappedShardPolicy::AbortBucket
            },
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load configuration
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(token) = cli.token {
        config.server.token = Some(token);
    }
    if cli.skip_verify {
        config.server.skip_verify = true;
    }

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    tracing::dispatcher::set_global_default(logger::build(log_level))
        .context("failed to initialize logging")?;

    tracing::info!("Starting tsdb-restore v{} (server: {})", env!("CARGO_PKG_VERSION"), config.server.host);

    match cli.command {
        Command::Restore(args) => {
            let options = args.into_options()?;
            let client = HttpClient::new(&config.server)?;

            let shutdown = ShutdownCoordinator::new();
            let cancel = shutdown.token();
            let signals = {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { shutdown.wait_for_signal().await })
            };

            let result = restore::run(&options, Services::from_client(&client), &cancel).await;

            // Stop listening for signals.
            shutdown.shutdown();
            let _ = signals.await;

            let progress = result?;
            println!(
                "Restored {}/{} shard(s), {} in {}",
                progress.shards_restored,
                progress.shards_total,
                format_bytes(progress.bytes_restored),
                format_duration(progress.elapsed().as_secs())
            );
            if progress.shards_unmapped > 0 {
                println!("{} shard(s) skipped without server catalog entries", progress.shards_unmapped);
            }
        }
    }

    Ok(())
}
