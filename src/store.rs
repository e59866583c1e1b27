//! The entry store: the `dreams` table is the source of truth and the mirror
//! is a full re-read of it after every mutation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{info, warn};

use crate::import::{self, ImportPlan, SkippedRecord};
use crate::model::{DreamDraft, DreamEntry};
use crate::{db, migrate, repo, AppError, AppResult};

pub type Mirror = Arc<Vec<DreamEntry>>;

/// Result of a bulk import that was accepted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: Vec<i64>,
    pub skipped: Vec<SkippedRecord>,
}

pub struct EntryStore {
    pool: SqlitePool,
    mirror: watch::Sender<Mirror>,
    error: Mutex<Option<AppError>>,
    // Held across write + reload so the mirror follows call order.
    writer: AsyncMutex<()>,
}

impl EntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (mirror, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            pool,
            mirror,
            error: Mutex::new(None),
            writer: AsyncMutex::new(()),
        }
    }

    /// Open the database file, migrate it and load the mirror.
    pub async fn open(db_path: &Path) -> AppResult<Self> {
        let pool = db::open_sqlite_pool(db_path).await.map_err(|err| {
            let error = AppError::new("STORE/INIT", "Could not open the dream database.")
                .with_context("path", db_path.display().to_string())
                .with_cause(err);
            error.log_with_event("store_open_failed");
            error
        })?;
        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> AppResult<Self> {
        let pool = db::open_memory_pool().await.map_err(|err| {
            AppError::new("STORE/INIT", "Could not open the dream database.").with_cause(err)
        })?;
        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ensure the schema exists at the current version, then load the mirror.
    /// Failures are returned and also recorded as the store's error state.
    pub async fn initialize(&self) -> AppResult<()> {
        let _guard = self.writer.lock().await;
        match migrate::apply_migrations(&self.pool).await {
            Ok(version) => {
                info!(target: "dream_journal", event = "store_initialized", schema_version = version);
            }
            Err(err) => {
                let error = AppError::new("STORE/INIT", "Could not prepare the dream database.")
                    .with_cause(err);
                error.log_with_event("store_init_failed");
                self.set_error(error.clone());
                return Err(error);
            }
        }
        self.reload_locked().await;
        Ok(())
    }

    /// The current mirror. Never touches the database.
    pub fn list(&self) -> Mirror {
        self.mirror.borrow().clone()
    }

    /// Observe mirror replacements.
    pub fn subscribe(&self) -> watch::Receiver<Mirror> {
        self.mirror.subscribe()
    }

    pub fn get(&self, id: i64) -> Option<DreamEntry> {
        self.mirror.borrow().iter().find(|e| e.id == id).cloned()
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.error.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn dismiss_error(&self) {
        if let Ok(mut guard) = self.error.lock() {
            *guard = None;
        }
    }

    /// Re-read the whole table into the mirror.
    pub async fn reload(&self) {
        let _guard = self.writer.lock().await;
        self.reload_locked().await;
    }

    async fn reload_locked(&self) {
        let entries = match repo::select_all(&self.pool).await {
            Ok(entries) => entries,
            Err(err) => {
                let error = AppError::new("STORE/READ", "Could not load your dreams.")
                    .with_cause(err);
                error.log_with_event("store_reload_failed");
                self.set_error(error);
                Vec::new()
            }
        };
        let count = entries.len();
        self.mirror.send_replace(Arc::new(entries));
        info!(target: "dream_journal", event = "mirror_reloaded", count);
    }

    /// Insert a new entry. Returns its id, or `None` when the write failed.
    pub async fn add(&self, draft: DreamDraft) -> Option<i64> {
        let _guard = self.writer.lock().await;
        let result = repo::insert(&self.pool, &draft).await;
        let id = self.record_write(result, "add");
        self.reload_locked().await;
        id
    }

    /// Overwrite every field of the entry with `entry.id`. An unknown id
    /// affects nothing and still counts as a completed write.
    pub async fn update(&self, entry: &DreamEntry) -> bool {
        let _guard = self.writer.lock().await;
        let result = repo::update(&self.pool, entry).await;
        let ok = self.record_write(result, "update").is_some();
        self.reload_locked().await;
        ok
    }

    pub async fn delete(&self, id: i64) -> bool {
        let _guard = self.writer.lock().await;
        let result = repo::delete(&self.pool, id).await;
        let ok = self.record_write(result, "delete").is_some();
        self.reload_locked().await;
        ok
    }

    /// Remove every entry. The user profile lives elsewhere and is untouched.
    pub async fn clear_all(&self) -> bool {
        let _guard = self.writer.lock().await;
        let result = repo::clear(&self.pool).await;
        let ok = self.record_write(result, "clear_all").is_some();
        self.reload_locked().await;
        ok
    }

    /// Insert every valid record of `raw` as a brand-new entry.
    ///
    /// A payload that is not a list is rejected before anything is written.
    /// Individual invalid records are skipped.
    pub async fn import_bulk(&self, raw: &Value) -> AppResult<ImportSummary> {
        let plan = import::plan(raw).map_err(reject_import)?;
        Ok(self.import_plan(plan).await)
    }

    /// Import the text of a plain JSON export.
    pub async fn import_json(&self, text: &str) -> AppResult<ImportSummary> {
        let plan = import::parse_text(text).map_err(reject_import)?;
        Ok(self.import_plan(plan).await)
    }

    /// Insert the accepted drafts of an already validated batch.
    pub async fn import_plan(&self, plan: ImportPlan) -> ImportSummary {
        let _guard = self.writer.lock().await;
        let mut summary = ImportSummary {
            inserted: Vec::with_capacity(plan.accepted.len()),
            skipped: plan.skipped,
        };
        for draft in &plan.accepted {
            let result = repo::insert(&self.pool, draft).await;
            if let Some(id) = self.record_write(result, "import") {
                summary.inserted.push(id);
            }
        }
        self.reload_locked().await;

        info!(
            target: "dream_journal",
            event = "import_complete",
            inserted = summary.inserted.len(),
            skipped = summary.skipped.len()
        );
        summary
    }

    /// Store text returned by the interpretation service on an entry.
    pub async fn set_interpretation(&self, id: i64, text: &str) -> AppResult<()> {
        self.modify(id, "set_interpretation", |entry| {
            entry.interpretation = text.to_string();
        })
        .await
    }

    /// Append a local image reference to an entry.
    pub async fn attach_image(&self, id: i64, image: &str) -> AppResult<()> {
        self.modify(id, "attach_image", |entry| entry.images.push(image.to_string()))
            .await
    }

    // Read-modify-write under the writer lock; the mirror only changes while
    // the lock is held, so the entry read here is the stored one.
    async fn modify(
        &self,
        id: i64,
        operation: &'static str,
        change: impl FnOnce(&mut DreamEntry),
    ) -> AppResult<()> {
        let _guard = self.writer.lock().await;
        let mut entry = self.require(id)?;
        change(&mut entry);
        let result = repo::update(&self.pool, &entry).await;
        let written = self.record_write(result, operation).is_some();
        self.reload_locked().await;
        if written {
            Ok(())
        } else {
            Err(self
                .last_error()
                .unwrap_or_else(|| AppError::new("STORE/WRITE", "Could not save your dream.")))
        }
    }

    fn require(&self, id: i64) -> AppResult<DreamEntry> {
        self.get(id).ok_or_else(|| {
            AppError::new("STORE/NOT_FOUND", "Dream not found.").with_context("id", id.to_string())
        })
    }

    fn record_write<T>(&self, result: Result<T, sqlx::Error>, operation: &'static str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let error = AppError::new("STORE/WRITE", "Could not save your dream.")
                    .with_context("operation", operation)
                    .with_cause(err);
                error.log_with_event("store_write_failed");
                self.set_error(error);
                None
            }
        }
    }

    fn set_error(&self, error: AppError) {
        if let Ok(mut guard) = self.error.lock() {
            *guard = Some(error);
        }
    }
}

fn reject_import(err: import::ImportError) -> AppError {
    warn!(target: "dream_journal", event = "import_rejected", error = %err);
    AppError::from(err)
}
