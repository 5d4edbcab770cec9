//! Front-end command layer. Every command takes the [`AppContext`] and
//! returns `Result<T, String>` so callers can show the error as-is.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::database;
use crate::models::Settings;
use crate::utils::config;

pub mod chat;
pub mod history;
pub mod intent;
pub mod settings;

/// Where commands find the settings file and database, plus the working
/// directory that `navigate` leaves behind for later commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    data_dir: PathBuf,
    working_dir: Arc<Mutex<Option<PathBuf>>>,
}

impl AppContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            working_dir: Arc::new(Mutex::new(None)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `None` until something sets it; executors then start from the process
    /// directory.
    pub fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir.lock().ok().and_then(|dir| dir.clone())
    }

    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) {
        if let Ok(mut current) = self.working_dir.lock() {
            *current = Some(dir.into());
        }
    }

    pub(crate) fn open_db(&self) -> Result<Connection, String> {
        database::init_database(&config::database_path(&self.data_dir)).map_err(|e| e.to_string())
    }

    pub(crate) fn load_settings(&self) -> Result<Settings, String> {
        config::load_settings(&self.data_dir).map_err(|e| e.to_string())
    }
}
