use std::sync::Arc;

use crate::ai::AiClient;
use crate::config::AppConfig;
use crate::profile::SettingsHandle;
use crate::store::EntryStore;
use crate::AppResult;

/// Handles owned by the application and passed to whatever needs them.
/// The entry store is the single writer of the dreams table.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<EntryStore>,
    pub settings: SettingsHandle,
    pub ai: AiClient,
}

impl AppState {
    /// Create the data layout, open and migrate the database, load settings.
    pub async fn open(config: AppConfig) -> AppResult<Self> {
        config.ensure_dirs()?;
        let store = EntryStore::open(&config.db_path()).await?;
        let settings = SettingsHandle::file(&config.settings_path());
        let ai = AiClient::new(config.ai_endpoint.clone());
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            settings,
            ai,
        })
    }
}
