use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::params::{ParamId, Parameters};

impl std::fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        writeln!(f, "Block Size: {}", self.block_size)?;
        writeln!(f, "Output Channels: {}", self.channels)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub block_size: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 128,
            channels: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub model_dir: String,
    pub last_model: Option<String>,
    /// Parameter values by name, applied on start.
    pub parameters: BTreeMap<String, f32>,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;

        writeln!(f, "Audio Settings:")?;
        writeln!(f, "{}", self.audio)?;

        writeln!(f, "Settings:")?;
        writeln!(f, "Model Directory: {}", self.model_dir)?;
        writeln!(
            f,
            "Last Model: {}",
            self.last_model.as_deref().unwrap_or("None")
        )?;
        writeln!(f, "Parameters:")?;
        for (name, value) in &self.parameters {
            writeln!(f, "  {name} = {value}")?;
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            model_dir: "./models".to_string(),
            last_model: None,
            parameters: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path();

        if settings_path.exists() {
            Self::load_from(&settings_path)
        } else {
            info!("No settings file found, using defaults");
            let settings = Self::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save();
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read settings file")?;
        let settings: Self = serde_json::from_str(&contents).context("Failed to parse settings")?;
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure the config directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {path:?}");
        Ok(())
    }

    pub fn get_settings_path() -> PathBuf {
        const SETTINGS_FILENAME: &str = "settings.json";

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("neuramp")
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("neuramp")
                .join(SETTINGS_FILENAME)
        } else {
            // Fallback to current directory
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }

    /// Push the stored values into `params`. Unknown names are skipped.
    pub fn apply_parameters(&self, params: &Parameters) {
        for (name, value) in &self.parameters {
            match ParamId::from_name(name) {
                Some(id) => params.set(id, *value),
                None => warn!("Ignoring unknown parameter '{name}' in settings"),
            }
        }
    }

    /// Record every current value from `params`.
    pub fn capture_parameters(&mut self, params: &Parameters) {
        self.parameters = ParamId::all()
            .map(|id| (id.name().to_string(), params.get(id)))
            .collect();
    }

    /// `last_model` resolved against `model_dir` when relative.
    pub fn last_model_path(&self) -> Option<PathBuf> {
        let last = Path::new(self.last_model.as_deref()?);
        if last.is_absolute() {
            Some(last.to_path_buf())
        } else {
            Some(Path::new(&self.model_dir).join(last))
        }
    }
}
