//! Service lifecycle management.
//!
//! Wires the store, dispatcher, orchestrator, log consumer and HTTP API
//! together, and handles signals and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::config::ControlConfig;
use crate::consumer::{run_consumer, LogPipeline};
use crate::dispatch::create_dispatcher;
use crate::error::{ControlError, ControlResult};
use crate::orchestrator::Orchestrator;
use crate::store::{ControlStore, MemoryStore, PostgresStore};

/// The control service.
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service.
    ///
    /// This will:
    /// 1. Connect to the database (or fall back to the in-memory store)
    /// 2. Create the compute dispatcher and orchestrator
    /// 3. Start the log pipeline consumer
    /// 4. Start the HTTP API server
    /// 5. Wait for a shutdown signal
    pub async fn run(&self) -> ControlResult<()> {
        let store = self.create_store().await;

        let dispatcher = create_dispatcher(&self.config.dispatcher)?;
        info!(
            dispatcher_type = ?self.config.dispatcher.dispatcher_type,
            "compute dispatcher configured"
        );

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            dispatcher,
            self.config.dispatcher.clone(),
            self.config.bus.clone(),
            self.config.artifacts.clone(),
            self.config.edge.clone(),
        ));
        info!("orchestrator initialised");

        let pipeline = LogPipeline::new(Arc::clone(&store));
        let consumer_config = self.config.bus.clone();
        let consumer_cancel = self.cancel.clone();
        let consumer_handle = tokio::spawn(async move {
            if let Err(e) = run_consumer(&consumer_config, pipeline, consumer_cancel).await {
                error!(error = %e, "log consumer exited with error");
            }
        });

        let state = AppState {
            orchestrator,
            store,
        };
        let app = api::router(state, &self.config.auth, self.config.rate_limit.as_ref())?;

        let addr = self.config.server.bind_address;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ControlError::Config(format!("failed to bind {addr}: {e}")))?;

        info!(address = %addr, "control service listening");

        let cancel = self.cancel.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| ControlError::Config(format!("server error: {e}")))?;

        self.cancel.cancel();
        if let Err(e) = consumer_handle.await {
            error!(error = %e, "log consumer task failed");
        }

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn create_store(&self) -> Arc<dyn ControlStore> {
        match PostgresStore::new(
            &self.config.database.url,
            self.config.database.max_connections,
        )
        .await
        {
            Ok(store) => {
                info!(url = %self.config.database.url, "connected to PostgreSQL");
                Arc::new(store)
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to connect to PostgreSQL, using in-memory store"
                );
                Arc::new(MemoryStore::new())
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
