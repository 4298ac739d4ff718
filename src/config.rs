//! Persistent frame configuration (`config.json`).
//!
//! The whole document is rewritten on every change: serialized to a sibling
//! temporary file, synced, then renamed over the original, so a crash never
//! leaves a half-written file behind.
//!
//! # Example
//!
//! ```rust,ignore
//! use inky_frame::config::ConfigStore;
//!
//! let store = ConfigStore::open("/data/config.json");
//! let updated = store.update(|cfg| {
//!     cfg.cycle_interval = 120;
//!     Ok(())
//! })?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::photos::validate_filename;
use crate::widgets::{Anchor, Position, WidgetSettings};
use crate::{Error, Orientation};

/// Shortest allowed cycle interval in seconds.
pub const MIN_CYCLE_INTERVAL: u64 = 60;

/// Longest allowed cycle interval in seconds (30 days).
pub const MAX_CYCLE_INTERVAL: u64 = 30 * 24 * 3600;

/// Cycle interval used when none is stored (1 hour).
pub const DEFAULT_CYCLE_INTERVAL: u64 = 3600;

/// The frame configuration as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether the scheduler rotates photos automatically
    pub cycle_enabled: bool,

    /// Seconds between automatic photo changes (never below 60)
    pub cycle_interval: u64,

    /// Display orientation
    pub orientation: Orientation,

    /// Photo currently on the panel
    #[serde(alias = "current_photo")]
    pub active_photo: Option<String>,

    /// Preferred cycling order; photos not listed follow, newest first
    pub photo_order: Vec<String>,

    /// Widget type -> settings
    pub widgets: BTreeMap<String, WidgetSettings>,

    /// IANA timezone for clock-based widgets (UTC when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut widgets = BTreeMap::new();
        widgets.insert(
            "date".to_string(),
            WidgetSettings {
                enabled: false,
                position: Position::Preset {
                    preset: Anchor::BottomRight,
                },
                portrait_position: None,
                style: serde_json::Map::new(),
            },
        );

        Self {
            cycle_enabled: false,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            orientation: Orientation::Landscape,
            active_photo: None,
            photo_order: Vec::new(),
            widgets,
            timezone: None,
        }
    }
}

impl Config {
    /// Check the invariants every persisted config must hold.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cycle_interval < MIN_CYCLE_INTERVAL {
            return Err(Error::validation(format!(
                "cycle_interval must be at least {} seconds, got {}",
                MIN_CYCLE_INTERVAL, self.cycle_interval
            )));
        }
        if self.cycle_interval > MAX_CYCLE_INTERVAL {
            return Err(Error::validation(format!(
                "cycle_interval must be at most {} seconds, got {}",
                MAX_CYCLE_INTERVAL, self.cycle_interval
            )));
        }
        for name in &self.photo_order {
            validate_filename(name)?;
        }
        if let Some(name) = &self.active_photo {
            validate_filename(name)?;
        }
        if let Some(tz) = &self.timezone {
            tz.parse::<Tz>()
                .map_err(|_| Error::validation(format!("unknown timezone '{}'", tz)))?;
        }
        Ok(())
    }

    /// Timezone for clock-based widgets.
    pub fn tz(&self) -> Tz {
        self.timezone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(Tz::UTC)
    }

    /// Current time in the configured timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz())
    }

    /// Remove every reference to a photo that no longer exists.
    pub fn forget_photo(&mut self, name: &str) {
        self.photo_order.retain(|n| n != name);
        if self.active_photo.as_deref() == Some(name) {
            self.active_photo = None;
        }
    }

    /// Repair values an older or hand-edited file may carry.
    fn normalize(mut self) -> Self {
        if self.cycle_interval < MIN_CYCLE_INTERVAL {
            tracing::warn!(
                "Stored cycle_interval {}s below minimum, clamping to {}s",
                self.cycle_interval,
                MIN_CYCLE_INTERVAL
            );
            self.cycle_interval = MIN_CYCLE_INTERVAL;
        }
        self.cycle_interval = self.cycle_interval.min(MAX_CYCLE_INTERVAL);
        self.photo_order
            .retain(|name| validate_filename(name).is_ok());
        if let Some(name) = &self.active_photo {
            if validate_filename(name).is_err() {
                self.active_photo = None;
            }
        }
        if let Some(tz) = &self.timezone {
            if tz.parse::<Tz>().is_err() {
                tracing::warn!("Ignoring unknown timezone '{}' in config", tz);
                self.timezone = None;
            }
        }
        self
    }
}

/// Load a config file, falling back to defaults.
///
/// A missing, unreadable or corrupt file never fails: the problem is logged
/// and defaults are returned. Keys missing from the file take their default
/// value.
pub fn load(path: &Path) -> Config {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No config at {}, using defaults", path.display());
            return Config::default();
        }
        Err(e) => {
            tracing::warn!("Failed to read config '{}': {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&content) {
        Ok(config) => config.normalize(),
        Err(e) => {
            tracing::warn!("Corrupt config '{}', using defaults: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Persist a config with write-then-rename.
pub fn save(path: &Path, config: &Config) -> Result<(), Error> {
    let json = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &json)
}

/// Write `bytes` to `path` through a temporary sibling file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .map_err(|e| Error::Storage(format!("Failed to create {}: {}", dir.display(), e)))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp = dir.join(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Storage(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Cached config with serialized read-modify-write.
///
/// Every mutation, from the API or the scheduler, goes through [`update`],
/// which holds one lock across read, modify, save and commit. Updates are
/// applied in lock order and each one sees the previous committed state.
///
/// [`update`]: ConfigStore::update
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: Mutex<Config>,
}

impl ConfigStore {
    /// Open the store, loading the file (or defaults).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = load(&path);
        Self {
            path,
            current: Mutex::new(config),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current config.
    pub fn snapshot(&self) -> Config {
        self.lock().clone()
    }

    /// Apply `change` to a copy of the config, validate, persist and commit.
    ///
    /// If the closure, validation or the write fails, neither the cached
    /// config nor the file changes.
    pub fn update<T, F>(&self, change: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Config) -> Result<T, Error>,
    {
        let mut current = self.lock();
        let mut next = current.clone();
        let out = change(&mut next)?;
        next.validate()?;
        if next != *current {
            save(&self.path, &next)?;
            *current = next;
        }
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
