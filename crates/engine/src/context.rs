//! Application context – configuration plus the shared client state.

use crate::cache::QueryCache;
use crate::client::ApiClient;
use crate::config::EngineConfig;
use crate::error::ApiResult;
use crate::import::{ApiImportBackend, ImportWizard};
use crate::monitor::SessionMonitor;
use crate::platform::{FileStorage, MemoryStorage, SystemClock};
use crate::retry::RetryPolicy;
use crate::services::*;
use crate::session::SessionStore;
use crate::traits::{Clock, KeyValueStorage};
use std::sync::Arc;
use std::time::Duration;

/// Central context passed to all engine operations.
///
/// Holds the session store, HTTP client and query cache, and hands out
/// service handles that share them. Storage and clock are trait objects so
/// callers can swap in-memory or manual implementations.
pub struct AppContext {
    config: EngineConfig,
    session: SessionStore,
    client: ApiClient,
    cache: Arc<QueryCache>,
    clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(
        config: EngineConfig,
        storage: Box<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> ApiResult<Self> {
        let session = SessionStore::new(storage);
        let client = ApiClient::new(
            &config.api,
            RetryPolicy::from(&config.retry),
            session.clone(),
        )?;
        let cache = Arc::new(QueryCache::new(Duration::from_secs(
            config.cache.stale_time_secs,
        )));
        Ok(Self {
            config,
            session,
            client,
            cache,
            clock,
        })
    }

    /// Session persisted to `session.storage_path`, system clock.
    pub fn from_config(config: EngineConfig) -> ApiResult<Self> {
        let storage = FileStorage::new(&config.session.storage_path);
        Self::new(config, Box::new(storage), Arc::new(SystemClock))
    }

    /// Nothing touches disk; used by tests and one-shot runs.
    pub fn in_memory(config: EngineConfig) -> ApiResult<Self> {
        Self::new(config, Box::new(MemoryStorage::new()), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.client.clone())
    }

    pub fn machines(&self) -> MachineService {
        MachineService::new(self.client.clone())
    }

    pub fn parts(&self) -> PartService {
        PartService::new(self.client.clone())
    }

    pub fn compatibility(&self) -> CompatibilityService {
        CompatibilityService::new(self.client.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.client.clone())
    }

    pub fn backups(&self) -> BackupService {
        BackupService::new(self.client.clone())
    }

    pub fn pdf(&self) -> PdfService {
        PdfService::new(self.client.clone())
    }

    pub fn training(&self) -> TrainingService {
        TrainingService::new(self.client.clone())
    }

    pub fn backup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.backup.poll_interval_ms)
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    pub fn session_monitor(&self) -> SessionMonitor {
        SessionMonitor::new(self.auth(), self.clock.clone(), &self.config.session)
    }

    pub fn import_wizard(&self) -> ImportWizard {
        ImportWizard::new(
            Arc::new(ApiImportBackend::new(self.pdf(), self.machines())),
            Duration::from_millis(self.config.import.batch_delay_ms),
        )
    }
}
