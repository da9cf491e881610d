//! Oneshare server.
//!
//! One-time encrypted document sharing over HTTP. An uploader receives a link
//! and a passphrase; the recipient can decrypt the document exactly once,
//! after which the ciphertext is destroyed. Wrong passphrases and age destroy
//! it too.
//!
//! # Architecture
//!
//! ```text
//!  HTTP (axum) ──► Lifecycle ──► DocumentRepository (redb / memory)
//!                     │     └──► BlobStore (files / memory)
//!  sweeper ───────────┘
//! ```
//!
//! # Components
//!
//! - [`Lifecycle`]: upload, check, retrieve and expiry rules (synchronous)
//! - [`storage`]: repository and blob store traits with their backends
//! - [`spawn_sweeper`]: periodic expiry on the tokio runtime
//! - [`http`]: router and handlers
//! - [`Server`]: binds a listener and runs router and sweeper together
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod http;
mod lifecycle;
pub mod storage;
mod sweeper;
mod system_env;

use std::{net::SocketAddr, sync::Arc};

pub use config::LifecycleConfig;
pub use error::ServerError;
pub use lifecycle::{
    ARCHIVE_CONTENT_TYPE, ARCHIVE_FILENAME, ErrorClass, Lifecycle, LifecycleError, Retrieved,
    SweepReport, UploadFile, UploadReceipt, UploadRequest,
};
use oneshare_core::Environment;
pub use storage::{
    BlobStore, ChaoticStorage, DocumentRepository, FsBlobStore, MemoryBlobStore,
    MemoryRepository, RedbRepository, StorageError, StorageOp,
};
pub use sweeper::spawn_sweeper;
pub use system_env::SystemEnv;
use tokio::{net::TcpListener, sync::watch};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Public URL prefix for share links
    pub base_url: String,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Production oneshare server.
///
/// Serves the HTTP router and runs the expiry sweeper until shutdown.
pub struct Server<E, R, B> {
    listener: TcpListener,
    engine: Arc<Lifecycle<E, R, B>>,
    base_url: String,
}

impl<E, R, B> Server<E, R, B>
where
    E: Environment,
    R: DocumentRepository,
    B: BlobStore,
{
    /// Bind the listener.
    pub async fn bind(
        config: ServerRuntimeConfig,
        engine: Lifecycle<E, R, B>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Transport(format!("failed to bind {}: {e}", config.bind_address))
        })?;

        Ok(Self {
            listener,
            engine: Arc::new(engine),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// In-flight requests and a running sweep are allowed to finish.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);

        let sweeper = spawn_sweeper(
            Arc::clone(&self.engine),
            self.engine.config().sweep_interval,
            shutdown.clone(),
        );

        let state = Arc::new(http::AppState { engine: self.engine, base_url: self.base_url });
        let app = http::router(state);

        let mut signal = shutdown;
        axum::serve(self.listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                // A dropped sender also means stop
                let _ = signal.wait_for(|stop| *stop).await;
            })
            .await?;

        sweeper.await.map_err(|e| ServerError::Internal(format!("sweeper task failed: {e}")))?;

        tracing::info!("Server stopped");
        Ok(())
    }
}
