//! s3fuse - Mount an S3 bucket as a FUSE filesystem
//!
//! Usage:
//!   s3fuse -b <bucket> -m <mount_point> [-k <access_key> -s <secret_key>]
//!          [-r <region>] [-e <endpoint>]
//!
//! Credentials fall back to the usual AWS environment variables.

use clap::Parser;
use s3fuse::fs::{ObjectFs, S3Fuse};
use s3fuse::store::S3Store;
use s3fuse::{Config, Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "s3fuse")]
#[command(author = "s3fuse Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mount an S3 bucket as a FUSE filesystem")]
struct Cli {
    /// Access key (defaults to AWS_ACCESS_KEY_ID)
    #[arg(short = 'k', long)]
    access_key: Option<String>,

    /// Secret key (defaults to AWS_SECRET_ACCESS_KEY)
    #[arg(short = 's', long)]
    secret_key: Option<String>,

    /// Bucket to mount
    #[arg(short, long)]
    bucket: Option<String>,

    /// AWS region
    #[arg(short, long)]
    region: Option<String>,

    /// Endpoint URL with scheme and port, for non-AWS object stores
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Mount point directory
    #[arg(short, long)]
    mount_point: Option<PathBuf>,

    /// Configuration file path (JSON); flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run(cli) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(key) = &cli.access_key {
        config.credentials.access_key = key.clone();
    }
    if let Some(key) = &cli.secret_key {
        config.credentials.secret_key = key.clone();
    }
    if let Some(bucket) = &cli.bucket {
        config.bucket = bucket.clone();
    }
    if let Some(region) = &cli.region {
        config.region = region.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(mount_point) = &cli.mount_point {
        config.mount_point = mount_point.clone();
    }
    if cli.allow_other {
        config.allow_other = true;
    }

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;

    info!("Connecting to bucket {}...", config.bucket);
    let core = runtime.block_on(async {
        let store = S3Store::connect(&config).await?;
        ObjectFs::new(Arc::new(store)).await
    })?;

    let mut options = vec![
        fuser::MountOption::FSName("s3fuse".to_string()),
        fuser::MountOption::AutoUnmount,
    ];
    if config.allow_other {
        options.push(fuser::MountOption::AllowOther);
    }

    let fs = S3Fuse::new(core, runtime);

    info!("Mounting {} at {:?}", config.bucket, config.mount_point);
    fuser::mount2(fs, &config.mount_point, &options)
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(())
}
