//! Application configuration (section 6): a single typed key/value store at
//! the application root, named profiles as full copies of it, and debounced
//! atomic writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Keys this application recognizes; anything else found in a loaded store
/// is logged and dropped rather than silently carried forward.
const KNOWN_KEYS: &[&str] = &[
    "detector_id",
    "acquisition_mode",
    "exposure_label",
    "integration_n",
    "window_min",
    "window_max",
    "keep_beam_on",
    "stages",
    "module_enabled",
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    pub auto_enabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The full typed configuration record (design note: replaces the source's
/// untyped JSON store).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_detector_id")]
    pub detector_id: String,
    #[serde(default = "default_acquisition_mode")]
    pub acquisition_mode: String,
    #[serde(default = "default_exposure_label")]
    pub exposure_label: String,
    #[serde(default = "default_integration_n")]
    pub integration_n: usize,
    #[serde(default)]
    pub window_min: f32,
    #[serde(default = "default_window_max")]
    pub window_max: f32,
    #[serde(default)]
    pub keep_beam_on: bool,
    #[serde(default)]
    pub stages: BTreeMap<String, StageConfig>,
    #[serde(default)]
    pub module_enabled: BTreeMap<String, bool>,
}

fn default_detector_id() -> String {
    "default".to_string()
}
fn default_acquisition_mode() -> String {
    "single".to_string()
}
fn default_exposure_label() -> String {
    "1.0".to_string()
}
fn default_integration_n() -> usize {
    4
}
fn default_window_max() -> f32 {
    65535.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            detector_id: default_detector_id(),
            acquisition_mode: default_acquisition_mode(),
            exposure_label: default_exposure_label(),
            integration_n: default_integration_n(),
            window_min: 0.0,
            window_max: default_window_max(),
            keep_beam_on: false,
            stages: BTreeMap::new(),
            module_enabled: BTreeMap::new(),
        }
    }
}

/// Loads `path` (if present) layered over defaults, with `XRAY_ACQUIRE_`
/// environment overrides, warning on any key the typed record doesn't know.
pub fn load(path: impl AsRef<Path>) -> AppResult<AppConfig> {
    let path = path.as_ref();
    let builder = Config::builder()
        .add_source(File::new(path.to_string_lossy().as_ref(), FileFormat::Json).required(false))
        .add_source(Environment::with_prefix("XRAY_ACQUIRE").separator("__"));
    let raw = builder.build()?;

    if let Ok(table) = raw.clone().try_deserialize::<BTreeMap<String, serde_json::Value>>() {
        for key in table.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                log::warn!("ignoring unknown configuration key: {key}");
            }
        }
    }

    Ok(raw.try_deserialize().unwrap_or_default())
}

fn write_atomic(path: &Path, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(config).unwrap_or_default();
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)
}

/// Debounced, atomic-write configuration store: a boolean "dirty" flag plus
/// a deadline replaces the source's ad-hoc pending-write state.
pub struct ConfigStore {
    root: PathBuf,
    current: Mutex<AppConfig>,
    dirty_since: Mutex<Option<Instant>>,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            root: root.into(),
            current: Mutex::new(config),
            dirty_since: Mutex::new(None),
        }
    }

    fn main_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.root.join("profiles").join(format!("{name}.json"))
    }

    pub fn snapshot(&self) -> AppConfig {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Replaces the in-memory config and marks it dirty for the next flush.
    pub fn update(&self, f: impl FnOnce(&mut AppConfig)) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut current);
        *self.dirty_since.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
    }

    /// Called from the UI tick: writes to disk only if dirty and the
    /// debounce window has elapsed, via a temp-file-then-rename.
    pub fn flush_if_due(&self, debounce: Duration) -> std::io::Result<bool> {
        let due = {
            let dirty_since = self.dirty_since.lock().unwrap_or_else(|p| p.into_inner());
            matches!(*dirty_since, Some(since) if since.elapsed() >= debounce)
        };
        if !due {
            return Ok(false);
        }
        let snapshot = self.snapshot();
        write_atomic(&self.main_path(), &snapshot)?;
        *self.dirty_since.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(true)
    }

    pub fn save_profile(&self, name: &str) -> std::io::Result<()> {
        write_atomic(&self.profile_path(name), &self.snapshot())
    }

    /// Loads `name` and overwrites the main store; per section 6, the
    /// caller must treat this as requiring an application restart.
    pub fn load_profile(&self, name: &str) -> AppResult<()> {
        let loaded = load(self.profile_path(name))?;
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = loaded;
        *self.dirty_since.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        Ok(())
    }
}
