//! Local-first dream journal core: the SQLite-backed entry store with its
//! always-fresh in-memory mirror, the zip backup codec, the user profile
//! settings and the client for the interpretation service.

pub mod ai;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod model;
pub mod profile;
pub mod repo;
pub mod state;
pub mod stats;
pub mod store;

pub use error::{AppError, AppResult};
pub use model::{DreamDraft, DreamEntry};
pub use profile::{SettingsHandle, UserProfile};
pub use state::AppState;
pub use store::{EntryStore, ImportSummary};
