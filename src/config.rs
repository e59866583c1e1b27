use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{AppError, AppResult};

pub const DATA_DIR_ENV: &str = "DREAM_JOURNAL_DATA_DIR";
pub const AI_URL_ENV: &str = "DREAM_JOURNAL_AI_URL";
pub const LOG_ENV: &str = "DREAM_JOURNAL_LOG";

pub const APP_IDENTIFIER: &str = "com.dreamjournal.app";
pub const DEFAULT_AI_URL: &str = "https://dream-be.vercel.app/api/dream";
pub const DEFAULT_LOG_FILTER: &str = "dream_journal=info,sqlx=warn";

const DB_FILE_NAME: &str = "dream-journal.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";
const IMAGES_DIR_NAME: &str = "images";
const BACKUPS_DIR_NAME: &str = "backups";
const LOGS_DIR_NAME: &str = "logs";

/// Runtime configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub ai_endpoint: String,
    pub log_filter: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var_os(DATA_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let ai_endpoint = env::var(AI_URL_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AI_URL.to_string());
        let log_filter = env::var(LOG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            data_dir,
            ai_endpoint,
            log_filter,
        }
    }

    /// Configuration rooted at an explicit directory, with default endpoint and filter.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ai_endpoint: DEFAULT_AI_URL.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(IMAGES_DIR_NAME)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUPS_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR_NAME)
    }

    /// Creates the data directory and every derived subdirectory.
    pub fn ensure_dirs(&self) -> AppResult<()> {
        for dir in [
            self.data_dir.clone(),
            self.images_dir(),
            self.backups_dir(),
            self.logs_dir(),
        ] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> AppResult<()> {
    fs::create_dir_all(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_data_dir")
            .with_context("path", dir.display().to_string())
    })
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_IDENTIFIER)
}
