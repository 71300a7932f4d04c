use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::EndpointsConfig;
use crate::core::{ExecutionRecord, Task};
use crate::errors::{Error, Result};

const TASKS_FILE: &str = "tasks.json";
const CONFIG_FILE: &str = "config.json";

/// Everything the repository and ledger own, persisted as one document so a
/// cascade deletion commits atomically: a crash can never leave records
/// whose task is gone.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub records: Vec<ExecutionRecord>,
}

/// JSON file persistence for tasks, execution records and endpoint
/// configuration.
///
/// Saves go through a temp-file-then-rename sequence so a partial write is
/// never observable at the target path.
#[derive(Debug)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(FileStore { data_dir })
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(TASKS_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Loads the persisted tasks and records.
    ///
    /// A missing file is an empty state; an unreadable or malformed file is
    /// `Error::CorruptState` so the caller can apply its backup-and-reset
    /// policy instead of crashing.
    pub fn load_state(&self) -> Result<PersistedState> {
        let path = self.tasks_path();
        if !path.exists() {
            return Ok(PersistedState::default());
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))
    }

    /// Atomically writes the full task/record state.
    pub fn save_state(&self, tasks: &[Task], records: &[ExecutionRecord]) -> Result<()> {
        let doc = serde_json::json!({ "tasks": tasks, "records": records });
        let body = serde_json::to_string_pretty(&doc)?;
        atomic_write(&self.tasks_path(), body.as_bytes())
    }

    /// Loads endpoint configuration; same missing/corrupt contract as
    /// `load_state`.
    pub fn load_config(&self) -> Result<EndpointsConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(EndpointsConfig::default());
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::CorruptState(format!("{}: {}", path.display(), e)))
    }

    /// Atomically writes endpoint configuration.
    pub fn save_config(&self, config: &EndpointsConfig) -> Result<()> {
        let body = serde_json::to_string_pretty(config)?;
        atomic_write(&self.config_path(), body.as_bytes())
    }

    /// Moves an unreadable tasks file aside under a timestamped name and
    /// returns the backup path, so the caller can start from an empty
    /// repository without discarding the user's data.
    pub fn backup_corrupt_state(&self) -> Result<Option<PathBuf>> {
        self.backup(&self.tasks_path())
    }

    /// Same policy for an unreadable config file.
    pub fn backup_corrupt_config(&self) -> Result<Option<PathBuf>> {
        self.backup(&self.config_path())
    }

    fn backup(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(TASKS_FILE);
        let backup = self.data_dir.join(format!(
            "{}.corrupt-{}",
            file_name,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        fs::rename(path, &backup)?;
        warn!("backed up unreadable {} to {}", file_name, backup.display());
        Ok(Some(backup))
    }
}

/// Writes to a temp file in the target directory, syncs it, then renames
/// over the target. Rename within one directory is atomic on POSIX.
fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::validation(format!("invalid store path '{}'", path.display())))?;
    let temp_path = parent.join(format!(".{}.tmp", file_name));

    let mut file = File::create(&temp_path)?;
    if let Err(e) = file.write_all(content).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    debug!("wrote {}", path.display());
    Ok(())
}
