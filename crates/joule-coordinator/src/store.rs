//! Persistence of user preferences.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::units::DisplayUnit;

/// Where the display-unit preference lives between runs.
pub trait PreferenceStore: Send + Sync {
    /// The saved unit, if any.
    fn load_display_unit(&self) -> Option<DisplayUnit>;

    /// Save `unit`.
    fn save_display_unit(&self, unit: DisplayUnit) -> Result<(), StoreError>;
}

/// Keeps preferences in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    unit: Mutex<Option<DisplayUnit>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `unit`.
    pub fn with_unit(unit: DisplayUnit) -> Self {
        MemoryStore {
            unit: Mutex::new(Some(unit)),
        }
    }
}

impl PreferenceStore for MemoryStore {
    fn load_display_unit(&self) -> Option<DisplayUnit> {
        *self.unit.lock()
    }

    fn save_display_unit(&self, unit: DisplayUnit) -> Result<(), StoreError> {
        *self.unit.lock() = Some(unit);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_unit: Option<DisplayUnit>,
}

/// Keeps preferences in a JSON file.
///
/// A missing or unreadable file loads as "no preference".
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Preferences, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Preferences::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl PreferenceStore for FileStore {
    fn load_display_unit(&self) -> Option<DisplayUnit> {
        match self.read() {
            Ok(prefs) => prefs.display_unit,
            Err(e) => {
                warn!("FileStore[{}]: ignoring unreadable preferences: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save_display_unit(&self, unit: DisplayUnit) -> Result<(), StoreError> {
        let mut prefs = self.read().unwrap_or_default();
        prefs.display_unit = Some(unit);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&prefs)?;
        fs::write(&self.path, json)?;
        debug!("FileStore[{}]: saved display unit {}", self.path.display(), unit);
        Ok(())
    }
}
