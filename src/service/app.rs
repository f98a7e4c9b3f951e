//! Main application state and service coordination
//!
//! `AppState` builds the storage backend, the war ledger and the HTTP
//! server from configuration, and owns the background tasks.

use crate::config::{AppConfig, StorageBackend};
use crate::metrics::{HttpServer, HttpServerConfig, MetricsCollector};
use crate::service::health::HealthCheck;
use crate::service::ledger::WarLedger;
use crate::storage::{
    FileLedgerStorage, FileSeasonArchive, InMemoryLedgerStorage, InMemorySeasonArchive,
    LedgerStorage, LedgerStorageExt, SeasonArchive,
};
use crate::types::ImportedRoster;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    ledger: Arc<WarLedger>,

    http_server: Arc<HttpServer>,

    background_tasks: Vec<JoinHandle<()>>,

    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);
        info!(
            "Configuration: storage={:?}, data_dir={}, import_season={}",
            config.storage.backend,
            config.storage.data_dir.display(),
            config.sheet.import_season
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let (storage, archive) = Self::initialize_storage(&config).await?;

        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let ledger = Arc::new(
            WarLedger::new(&config, storage, archive, metrics).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to initialize war ledger: {}", e),
                }
            })?,
        );

        Self::import_configured_sheet(&config, &ledger).await;

        let http_server = Arc::new(HttpServer::new(
            HttpServerConfig {
                port: config.service.http_port,
                host: config.service.http_host.clone(),
                service_name: config.service.name.clone(),
            },
            ledger.clone(),
        ));

        Ok(Self {
            config,
            ledger,
            http_server,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the HTTP server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        *self.is_running.write().await = true;

        self.start_http_server().await?;
        self.start_background_tasks();

        info!("✅ {} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        *self.is_running.write().await = false;

        if let Err(e) = self.http_server.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        } else {
            info!("✅ HTTP server stopped");
        }

        self.stop_background_tasks().await;

        let final_stats = HealthCheck::check(&self.ledger, &self.config.service.name)
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;

        info!("Final ledger statistics: {:?}", final_stats.stats);
        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn ledger(&self) -> Arc<WarLedger> {
        self.ledger.clone()
    }

    pub fn http_server(&self) -> Arc<HttpServer> {
        self.http_server.clone()
    }

    /// Build the record store and season archive for the configured backend
    async fn initialize_storage(
        config: &AppConfig,
    ) -> Result<(Arc<dyn LedgerStorage>, Arc<dyn SeasonArchive>), ServiceError> {
        match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage; data is lost on exit");
                Ok((
                    Arc::new(InMemoryLedgerStorage::new()),
                    Arc::new(InMemorySeasonArchive::new()),
                ))
            }
            StorageBackend::File => {
                let data_dir = &config.storage.data_dir;
                info!("Using file storage under {}", data_dir.display());

                let storage =
                    FileLedgerStorage::new(data_dir).map_err(|e| ServiceError::Initialization {
                        message: format!("Failed to open ledger storage: {}", e),
                    })?;
                let archive = FileSeasonArchive::new(data_dir).await.map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to open season archive: {}", e),
                    }
                })?;

                Ok((Arc::new(storage), Arc::new(archive)))
            }
        }
    }

    /// Import the configured roster sheet when nothing has been imported yet
    async fn import_configured_sheet(config: &AppConfig, ledger: &WarLedger) {
        let Some(path) = &config.sheet.roster_csv else {
            debug!("No roster sheet configured");
            return;
        };

        match ledger.storage().load::<ImportedRoster>() {
            Ok(Some(_)) => {
                debug!("Roster already imported, skipping {}", path.display());
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Could not check for an existing import: {}", e);
                return;
            }
        }

        match ledger.import_roster_sheet(path).await {
            Ok(count) => info!("Imported {} players from {}", count, path.display()),
            Err(e) => warn!("Failed to import roster sheet {}: {}", path.display(), e),
        }
    }

    async fn start_http_server(&mut self) -> Result<(), ServiceError> {
        let http_server = self.http_server.clone();
        let port = self.config.service.http_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = http_server.start().await {
                error!("HTTP server failed: {}", e);
            } else {
                info!("HTTP server task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ HTTP server started on port {}", port);
        Ok(())
    }

    fn start_background_tasks(&mut self) {
        info!("Starting health metrics task (60s interval)...");

        let ledger = self.ledger.clone();
        let is_running = self.is_running.clone();
        let service_name = self.config.service.name.clone();

        let health_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            let start_time = tokio::time::Instant::now();

            while *is_running.read().await {
                interval.tick().await;

                let uptime_seconds = start_time.elapsed().as_secs() as i64;
                ledger.metrics().service().uptime_seconds.set(uptime_seconds);

                match HealthCheck::check(&ledger, &service_name).await {
                    Ok(health) => debug!(
                        "Health {} - uptime {}s, {} players",
                        health.status, uptime_seconds, health.stats.roster_size
                    ),
                    Err(e) => warn!("Periodic health check failed: {}", e),
                }
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.push(health_task);
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        let timeout = self.config.shutdown_timeout();
        for task in self.background_tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(timeout, task).await.is_err() {
                debug!("Background task did not finish in {:?}, aborting", timeout);
                abort.abort();
            }
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
