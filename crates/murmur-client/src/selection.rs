//! Persists the currently open conversation so it can be reopened after the
//! session is restored.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use murmur_shared::UserId;

use crate::error::Result;

pub trait SelectionStore: Send + Sync {
    fn load(&self) -> Option<UserId>;
    fn save(&self, partner: Option<&UserId>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionFile {
    #[serde(default)]
    selected_user: Option<UserId>,
}

/// JSON file in the platform data directory.
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/murmur/selection.json`, if the platform has a data dir.
    pub fn default_location() -> Option<Self> {
        let dirs = directories::ProjectDirs::from("com", "murmur", "murmur")?;
        Some(Self::new(dirs.data_dir().join("selection.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SelectionStore for FileSelectionStore {
    fn load(&self) -> Option<UserId> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<SelectionFile>(&raw) {
            Ok(file) => file.selected_user,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt selection file");
                None
            }
        }
    }

    fn save(&self, partner: Option<&UserId>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = SelectionFile {
            selected_user: partner.cloned(),
        };
        std::fs::write(&self.path, serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }
}

/// Selection kept only for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    selected: Mutex<Option<UserId>>,
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self) -> Option<UserId> {
        self.selected.lock().ok().and_then(|s| s.clone())
    }

    fn save(&self, partner: Option<&UserId>) -> Result<()> {
        if let Ok(mut selected) = self.selected.lock() {
            *selected = partner.cloned();
        }
        Ok(())
    }
}
