//! Oneshare server binary.
//!
//! # Usage
//!
//! ```bash
//! ONESHARE_HASH_SALT=change-me oneshare-server --bind 0.0.0.0:8080 \
//!     --data-dir /var/lib/oneshare --base-url https://share.example.com
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use oneshare_crypto::{
    CryptoConfig, CryptoEngine, DEFAULT_ITERATIONS, DEFAULT_KEY_LEN, DEFAULT_SALT_LEN,
};
use oneshare_server::{
    FsBlobStore, Lifecycle, LifecycleConfig, RedbRepository, Server, ServerRuntimeConfig,
    SystemEnv,
};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// One-time encrypted document sharing server
#[derive(Parser, Debug)]
#[command(name = "oneshare-server")]
#[command(about = "One-time encrypted document sharing server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "ONESHARE_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Directory for the document database and encrypted blobs
    #[arg(short, long, env = "ONESHARE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Public URL prefix for share links
    #[arg(long, env = "ONESHARE_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Server-side salt for requester fingerprints
    #[arg(long, env = "ONESHARE_HASH_SALT", hide_env_values = true)]
    hash_salt: String,

    /// PBKDF2 iteration count
    #[arg(long, env = "ONESHARE_KDF_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    kdf_iterations: u32,

    /// Derived key length in bytes (16 or 32)
    #[arg(long, env = "ONESHARE_KEY_LENGTH", default_value_t = DEFAULT_KEY_LEN)]
    key_length: usize,

    /// Envelope salt length in bytes
    #[arg(long, env = "ONESHARE_SALT_LENGTH", default_value_t = DEFAULT_SALT_LEN)]
    salt_length: usize,

    /// Largest accepted upload in bytes
    #[arg(
        long,
        env = "ONESHARE_MAX_UPLOAD_BYTES",
        default_value_t = LifecycleConfig::DEFAULT_MAX_UPLOAD_BYTES
    )]
    max_upload_bytes: u64,

    /// Uploads allowed per requester per hour
    #[arg(long, env = "ONESHARE_UPLOADS_PER_HOUR", default_value = "5")]
    uploads_per_hour: u64,

    /// Hours before an undelivered document expires
    #[arg(long, env = "ONESHARE_RETENTION_HOURS", default_value = "24")]
    retention_hours: u64,

    /// Wrong passphrases tolerated before a document locks
    #[arg(long, env = "ONESHARE_MAX_FAILED_ATTEMPTS", default_value = "3")]
    max_failed_attempts: u32,

    /// Seconds between expiry sweeps
    #[arg(long, env = "ONESHARE_SWEEP_INTERVAL_SECS", default_value = "60")]
    sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ONESHARE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Oneshare server starting");

    if args.hash_salt.len() < 16 {
        tracing::warn!("Hash salt is shorter than 16 characters");
    }

    let crypto = CryptoEngine::new(CryptoConfig {
        iterations: args.kdf_iterations,
        key_len: args.key_length,
        salt_len: args.salt_length,
        hash_salt: args.hash_salt,
    })?;

    let lifecycle = LifecycleConfig {
        max_upload_bytes: args.max_upload_bytes,
        uploads_per_window: args.uploads_per_hour,
        rate_limit_window: hours(1),
        retention: hours(args.retention_hours),
        max_failed_attempts: args.max_failed_attempts.max(1),
        sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
    };

    std::fs::create_dir_all(&args.data_dir)?;
    let documents = RedbRepository::open(args.data_dir.join("documents.redb"))?;
    let blobs = FsBlobStore::open(args.data_dir.join("blobs"))?;
    tracing::info!("Data directory {}", args.data_dir.display());

    let engine = Lifecycle::new(SystemEnv::new(), documents, blobs, crypto, lifecycle);
    let config = ServerRuntimeConfig { bind_address: args.bind, base_url: args.base_url };
    let server = Server::bind(config, engine).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Duration of `n` hours, saturating instead of overflowing.
fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60 * 60))
}
