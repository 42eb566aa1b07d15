use std::sync::Arc;
use std::time::Duration;
use tamio_core::api::http::HttpTamioApi;
use tamio_core::api::TamioApi;
use tamio_core::config::Settings;
use tamio_core::storage::sqlite::SqliteKvStore;
use tamio_core::storage::{debounce, KeyValueStore, MemoryKvStore};
use tamio_core::store::dashboard::DashboardStore;
use tamio_core::store::forecast::UnifiedForecastStore;
use tamio_core::store::rules::RulesStore;
use tamio_core::time::local_day;

/// Per-invocation wiring: one user, one storage backend, one API client.
pub struct Session {
    pub user_id: String,
    settings: Settings,
    storage: Arc<dyn KeyValueStore>,
    delay: Duration,
}

impl Session {
    pub async fn open(settings: Settings, user_id: &str) -> Self {
        let storage = open_storage(&settings).await;
        Self {
            user_id: user_id.to_string(),
            settings,
            storage,
            delay: debounce::delay_from_env(),
        }
    }

    pub async fn dashboard(&self) -> DashboardStore {
        DashboardStore::load(&self.user_id, Arc::clone(&self.storage), self.delay).await
    }

    pub async fn rules(&self) -> anyhow::Result<RulesStore> {
        let offset = local_day::offset_from_env()?;
        Ok(RulesStore::load(&self.user_id, offset, Arc::clone(&self.storage), self.delay).await)
    }

    pub fn api(&self) -> anyhow::Result<Arc<dyn TamioApi>> {
        Ok(Arc::new(HttpTamioApi::from_settings(&self.settings)?))
    }

    pub fn forecast(&self) -> anyhow::Result<UnifiedForecastStore> {
        Ok(UnifiedForecastStore::new(&self.user_id, self.api()?))
    }
}

/// SQLite when `DATABASE_URL` is set and reachable; otherwise the session
/// keeps its state in memory.
async fn open_storage(settings: &Settings) -> Arc<dyn KeyValueStore> {
    let Some(url) = settings.database_url.as_deref() else {
        tracing::debug!("DATABASE_URL not set; client storage is in memory");
        return Arc::new(MemoryKvStore::new());
    };
    match SqliteKvStore::connect(url).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                "client storage unavailable; continuing in memory"
            );
            Arc::new(MemoryKvStore::new())
        }
    }
}
