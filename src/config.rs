use crate::app_dirs::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tuning knobs for the engine. Every field has a default so partial config files work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Keypresses buffered before a batch is handed to the journal.
    pub batch_size: usize,
    /// Session summaries retained in history.
    pub history_limit: usize,
    /// Sessions outside `[wpm_floor, wpm_ceiling]` are kept but ignored by aggregates.
    pub wpm_floor: f64,
    pub wpm_ceiling: f64,
    pub min_key_attempts: u32,
    pub challenging_error_rate: f64,
    pub trend_window: usize,
    /// Speed that counts as "full marks" in the accuracy/speed blend.
    pub reference_wpm: f64,
    pub min_feed_gain: f64,
    pub max_feed_gain: f64,
    pub incorrect_penalty: f64,
    pub sad_pulse_ms: i64,
    /// Happiness moved by a session whose performance delta is +/-1.
    pub session_happiness_swing: f64,
    /// Accuracy achievements and personal bests need at least this many keypresses.
    pub min_chars_for_accuracy: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            history_limit: 100,
            wpm_floor: 1.0,
            wpm_ceiling: 300.0,
            min_key_attempts: 5,
            challenging_error_rate: 0.20,
            trend_window: 7,
            reference_wpm: 30.0,
            min_feed_gain: 1.0,
            max_feed_gain: 5.0,
            incorrect_penalty: 3.0,
            sad_pulse_ms: 3_000,
            session_happiness_swing: 20.0,
            min_chars_for_accuracy: 20,
        }
    }
}

impl EngineConfig {
    pub fn is_plausible_wpm(&self, wpm: f64) -> bool {
        crate::metrics::is_plausible_wpm(wpm, self.wpm_floor, self.wpm_ceiling)
    }
}

pub trait ConfigStore {
    fn load(&self) -> EngineConfig;
    fn save(&self, cfg: &EngineConfig) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path =
            AppDirs::config_path().unwrap_or_else(|| PathBuf::from("typingotchi_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> EngineConfig {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return EngineConfig::default(),
        };
        match serde_json::from_slice::<EngineConfig>(&bytes) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unreadable config"
                );
                EngineConfig::default()
            }
        }
    }

    fn save(&self, cfg: &EngineConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = EngineConfig::default();
        store.save(&cfg).unwrap();
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "batch_size": 5, "reference_wpm": 15.0 }"#).unwrap();

        let loaded = FileConfigStore::with_path(&path).load();
        assert_eq!(loaded.batch_size, 5);
        assert_eq!(loaded.reference_wpm, 15.0);
        assert_eq!(loaded.history_limit, 100);
    }

    #[test]
    fn missing_or_garbage_config_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(FileConfigStore::with_path(&path).load(), EngineConfig::default());

        fs::write(&path, "not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), EngineConfig::default());
    }

    #[test]
    fn plausible_wpm_range() {
        let cfg = EngineConfig::default();
        assert!(cfg.is_plausible_wpm(1.0));
        assert!(cfg.is_plausible_wpm(300.0));
        assert!(!cfg.is_plausible_wpm(0.5));
        assert!(!cfg.is_plausible_wpm(350.0));
    }
}
