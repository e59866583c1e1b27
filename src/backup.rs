//! Portable backups: a zip holding `dreams.json` plus the referenced local
//! images under `images/`, and the plain JSON export without images.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::task;
use tracing::{info, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::import::{self, ImportPlan};
use crate::model::DreamEntry;
use crate::store::{EntryStore, ImportSummary};
use crate::{db, AppError, AppResult};

pub const DATA_ENTRY: &str = "dreams.json";
pub const IMAGES_FOLDER: &str = "images/";
const FILE_PREFIX: &str = "DreamJournal_Backup_";
const FILE_SCHEME: &str = "file://";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup is missing dreams.json")]
    MissingData,
    #[error("dreams.json is not valid JSON: {0}")]
    InvalidData(#[source] serde_json::Error),
    #[error("backup task failed: {0}")]
    Task(String),
}

impl From<BackupError> for AppError {
    fn from(error: BackupError) -> Self {
        match error {
            BackupError::MissingData => {
                AppError::new("BACKUP/MISSING_DATA", "Invalid backup: missing dreams.json.")
            }
            BackupError::InvalidData(err) => {
                AppError::new("BACKUP/INVALID_DATA", "Invalid backup: unreadable dreams.json.")
                    .with_cause(err)
            }
            BackupError::Task(msg) => AppError::new("BACKUP/TASK", "Backup task panicked")
                .with_context("error", msg),
        }
    }
}

/// Validated archive contents. `images` maps archived file names to the
/// paths they were written to on this device.
#[derive(Debug, Clone)]
pub struct RestoredBackup {
    pub plan: ImportPlan,
    pub images: BTreeMap<String, PathBuf>,
}

impl RestoredBackup {
    /// Point local image references at the files materialized by the restore.
    /// Remote URLs and references with no restored file are left as they are.
    pub fn remap_images(&mut self) -> usize {
        let restored = &self.images;
        let mut remapped = 0;
        for image in self.plan.accepted.iter_mut().flat_map(|d| d.images.iter_mut()) {
            if !is_local_reference(image) {
                continue;
            }
            if let Some(path) = file_name_of(image).and_then(|name| restored.get(name)) {
                *image = path.display().to_string();
                remapped += 1;
            }
        }
        remapped
    }
}

/// True for `file://` URIs and absolute paths; remote URLs are not local.
pub fn is_local_reference(uri: &str) -> bool {
    uri.starts_with(FILE_SCHEME) || uri.starts_with('/') || Path::new(uri).is_absolute()
}

fn local_path(uri: &str) -> &Path {
    Path::new(uri.strip_prefix(FILE_SCHEME).unwrap_or(uri))
}

/// Last `/`-separated segment of a reference.
pub fn file_name_of(uri: &str) -> Option<&str> {
    uri.rsplit(['/', '\\']).next().filter(|name| !name.is_empty())
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}.zip", date.format("%Y-%m-%d"))
}

pub fn json_export_file_name(date: NaiveDate) -> String {
    format!("{FILE_PREFIX}{}.json", date.format("%Y-%m-%d"))
}

pub async fn export_backup(entries: &[DreamEntry], out_dir: &Path) -> AppResult<PathBuf> {
    export_backup_dated(entries, out_dir, Utc::now().date_naive()).await
}

/// Write the archive for `entries` into `out_dir` and return its path.
pub async fn export_backup_dated(
    entries: &[DreamEntry],
    out_dir: &Path,
    date: NaiveDate,
) -> AppResult<PathBuf> {
    let entries = entries.to_vec();
    let out_dir = out_dir.to_path_buf();
    task::spawn_blocking(move || write_backup_archive(&entries, &out_dir, date))
        .await
        .map_err(|err| BackupError::Task(err.to_string()))?
}

fn write_backup_archive(
    entries: &[DreamEntry],
    out_dir: &Path,
    date: NaiveDate,
) -> AppResult<PathBuf> {
    let payload = serde_json::to_vec_pretty(entries)
        .map_err(|err| AppError::from(err).with_context("operation", "backup_serialize"))?;
    let images = collect_images(entries);

    fs::create_dir_all(out_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "backup_create_dir")
            .with_context("path", out_dir.display().to_string())
    })?;
    let zip_path = out_dir.join(backup_file_name(date));

    // Build next to the destination and rename, so a failed run leaves no archive.
    let mut tmp = NamedTempFile::new_in(out_dir)
        .map_err(|err| AppError::from(err).with_context("operation", "backup_zip_create"))?;
    {
        let mut writer = ZipWriter::new(tmp.as_file_mut());
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(DATA_ENTRY, options)
            .map_err(|err| map_zip_error(err, "backup_zip_data_entry"))?;
        writer
            .write_all(&payload)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_zip_data_write"))?;
        writer
            .add_directory(IMAGES_FOLDER, options)
            .map_err(|err| map_zip_error(err, "backup_zip_dir"))?;
        for (name, bytes) in &images {
            writer
                .start_file(format!("{IMAGES_FOLDER}{name}"), options)
                .map_err(|err| map_zip_error(err, "backup_zip_image_entry"))?;
            writer.write_all(bytes).map_err(|err| {
                AppError::from(err).with_context("operation", "backup_zip_image_write")
            })?;
        }
        writer
            .finish()
            .map_err(|err| map_zip_error(err, "backup_zip_finish"))?;
    }
    tmp.persist(&zip_path).map_err(|err| {
        AppError::from(err.error)
            .with_context("operation", "backup_zip_persist")
            .with_context("path", zip_path.display().to_string())
    })?;

    info!(
        target: "dream_journal",
        event = "backup_exported",
        path = %zip_path.display(),
        entries = entries.len(),
        images = images.len()
    );
    Ok(zip_path)
}

/// Read every local image once per file name. Unreadable images are skipped.
fn collect_images(entries: &[DreamEntry]) -> Vec<(String, Vec<u8>)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut images = Vec::new();
    for uri in entries.iter().flat_map(|e| e.images.iter()) {
        if !is_local_reference(uri) {
            continue;
        }
        let Some(name) = file_name_of(uri) else {
            continue;
        };
        // Keyed by file name: a second image with the same name is dropped.
        if seen.contains(name) {
            continue;
        }
        match fs::read(local_path(uri)) {
            Ok(bytes) => {
                seen.insert(name.to_string());
                images.push((name.to_string(), bytes));
            }
            Err(err) => {
                warn!(
                    target: "dream_journal",
                    event = "backup_image_skipped",
                    image = %uri,
                    error = %err
                );
            }
        }
    }
    images
}

/// Open an archive, validate `dreams.json`, then materialize its images into
/// `images_dir`. Nothing is written when the data is missing or rejected.
/// Records are not remapped here.
pub async fn restore_backup(archive: &Path, images_dir: &Path) -> AppResult<RestoredBackup> {
    let archive = archive.to_path_buf();
    let images_dir = images_dir.to_path_buf();
    task::spawn_blocking(move || read_backup_archive(&archive, &images_dir))
        .await
        .map_err(|err| BackupError::Task(err.to_string()))?
}

fn read_backup_archive(archive: &Path, images_dir: &Path) -> AppResult<RestoredBackup> {
    let file = File::open(archive).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "backup_open")
            .with_context("path", archive.display().to_string())
    })?;
    let mut zip = ZipArchive::new(file).map_err(AppError::from)?;

    let records: Value = {
        let mut data = zip.by_name(DATA_ENTRY).map_err(|err| match err {
            ZipError::FileNotFound => AppError::from(BackupError::MissingData),
            other => AppError::from(other),
        })?;
        let mut text = String::new();
        data.read_to_string(&mut text)
            .map_err(|err| AppError::from(err).with_context("operation", "backup_read_data"))?;
        serde_json::from_str(&text).map_err(BackupError::InvalidData)?
    };
    let plan = import::plan(&records).map_err(|err| {
        warn!(target: "dream_journal", event = "restore_rejected", error = %err);
        AppError::from(err)
    })?;

    fs::create_dir_all(images_dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "restore_create_images_dir")
            .with_context("path", images_dir.display().to_string())
    })?;

    let mut images = BTreeMap::new();
    for index in 0..zip.len() {
        let mut member = match zip.by_index(index) {
            Ok(member) => member,
            Err(err) => {
                warn!(target: "dream_journal", event = "restore_image_skipped", index, error = %err);
                continue;
            }
        };
        if member.is_dir() {
            continue;
        }
        let Some(name) = member.name().strip_prefix(IMAGES_FOLDER).map(str::to_string) else {
            continue;
        };
        if !is_plain_file_name(&name) {
            warn!(target: "dream_journal", event = "restore_image_rejected", name = %name);
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(err) = member.read_to_end(&mut bytes) {
            warn!(target: "dream_journal", event = "restore_image_skipped", name = %name, error = %err);
            continue;
        }
        let dest = images_dir.join(&name);
        if let Err(err) = db::write_atomic(&dest, &bytes) {
            warn!(target: "dream_journal", event = "restore_image_skipped", name = %name, error = %err);
            continue;
        }
        images.insert(name, dest);
    }

    info!(
        target: "dream_journal",
        event = "backup_restored",
        path = %archive.display(),
        images = images.len()
    );
    Ok(RestoredBackup { plan, images })
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).components().count() == 1
}

/// Restore an archive into `store`: records are validated, images written,
/// references rewritten to the restored files, then the drafts are inserted.
pub async fn restore_into_store(
    store: &EntryStore,
    archive: &Path,
    images_dir: &Path,
) -> AppResult<ImportSummary> {
    let mut restored = restore_backup(archive, images_dir).await?;
    let remapped = restored.remap_images();
    info!(target: "dream_journal", event = "restore_images_remapped", remapped);
    Ok(store.import_plan(restored.plan).await)
}

pub async fn export_json(entries: &[DreamEntry], out_dir: &Path) -> AppResult<PathBuf> {
    export_json_dated(entries, out_dir, Utc::now().date_naive()).await
}

/// Plain, human-readable JSON export without image bytes.
pub async fn export_json_dated(
    entries: &[DreamEntry],
    out_dir: &Path,
    date: NaiveDate,
) -> AppResult<PathBuf> {
    let payload = serde_json::to_vec_pretty(entries)
        .map_err(|err| AppError::from(err).with_context("operation", "json_export_serialize"))?;
    let path = out_dir.join(json_export_file_name(date));
    let dest = path.clone();
    task::spawn_blocking(move || db::write_atomic(&dest, &payload))
        .await
        .map_err(|err| BackupError::Task(err.to_string()))?
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "json_export_write")
                .with_context("path", path.display().to_string())
        })?;
    info!(target: "dream_journal", event = "json_exported", path = %path.display(), entries = entries.len());
    Ok(path)
}

fn map_zip_error(err: ZipError, operation: &'static str) -> AppError {
    AppError::new("BACKUP/ZIP", "Failed to write backup archive.")
        .with_context("operation", operation)
        .with_context("error", err.to_string())
}
