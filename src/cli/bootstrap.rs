//! Opens the data directory and wires the services a command needs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::debug;

use crate::db::Database;
use crate::session::SessionController;
use crate::settings::{SettingsStore, StudySettings};
use crate::storage::KeyValueStore;

use super::args::Args;

const APP_DIR_NAME: &str = "media-time";
const DB_FILE_NAME: &str = "media-time.sqlite3";
const SETTINGS_FILE_NAME: &str = "settings.json";

pub struct CliContext {
    pub data_dir: PathBuf,
    pub settings_store: SettingsStore,
    /// Stored settings with environment overrides applied.
    pub settings: StudySettings,
    pub sessions: SessionController,
    pub json: bool,
}

impl CliContext {
    pub fn export_dir(&self) -> PathBuf {
        self.settings
            .export
            .output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("exports"))
    }
}

pub fn resolve_data_dir(args: &Args) -> Result<PathBuf> {
    match &args.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|base| base.join(APP_DIR_NAME))
            .ok_or_else(|| anyhow!("no data directory on this platform; pass --data-dir")),
    }
}

pub async fn initialize(args: &Args) -> Result<CliContext> {
    let data_dir = resolve_data_dir(args)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    debug!("Using data directory {}", data_dir.display());

    let database = Database::new(data_dir.join(DB_FILE_NAME))?;
    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
    let settings = settings_store.effective();

    let store: Arc<dyn KeyValueStore> = Arc::new(database);
    let sessions = SessionController::hydrate(store, settings.session_config()).await;

    Ok(CliContext {
        data_dir,
        settings_store,
        settings,
        sessions,
        json: args.json,
    })
}
