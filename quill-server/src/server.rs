//! HTTP server with the cleanup scheduler alongside

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use quill_core::config::Config;
use quill_core::core_collab::CleanupScheduler;
use quill_core::ports::FsObjectStore;

use crate::api::build_router;
use crate::state::AppState;

/// Serves the API and runs cleanup until shutdown
pub struct QuillServer {
    state: Arc<AppState>,
    config: Config,
}

impl QuillServer {
    pub fn new(state: Arc<AppState>, config: Config) -> Self {
        Self { state, config }
    }

    /// Start the server and run until the shutdown coordinator fires
    pub async fn run(self) -> Result<()> {
        let shutdown = self.state.shutdown.clone();

        let objects = FsObjectStore::new(self.config.cleanup.media_root.clone());
        info!(media_root = %objects.root().display(), "Cleaning up generated media");
        let cleanup = CleanupScheduler::new(
            self.state.store.clone(),
            Arc::new(objects),
            shutdown.clone(),
            &self.config.cleanup,
        );
        let cleanup_task = tokio::spawn(async move { cleanup.run().await });

        let router = build_router(self.state.clone());
        let listener = TcpListener::bind(self.config.server.bind_address).await?;
        info!(address = %self.config.server.bind_address, "Quill server listening");

        let signal = {
            let shutdown = shutdown.clone();
            async move { shutdown.wait_for_shutdown().await }
        };
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        info!("HTTP server stopped, waiting for cleanup");
        match tokio::time::timeout(shutdown.grace_period(), cleanup_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Cleanup task failed"),
            Err(_) => warn!("Cleanup did not stop within the shutdown timeout"),
        }

        shutdown.mark_complete().await;
        Ok(())
    }
}
