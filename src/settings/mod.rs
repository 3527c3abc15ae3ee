use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Marker value meaning "no file selected" in persisted session fields.
pub const NULL_SENTINEL: &str = "null";

impl std::fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Input Port: {}", self.input_port)?;
        writeln!(f, "Output Left Port: {}", self.output_left_port)?;
        writeln!(f, "Output Right Port: {}", self.output_right_port)?;
        writeln!(f, "Buffer Size: {}", self.buffer_size)?;
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    pub input_port: String,
    pub output_left_port: String,
    pub output_right_port: String,
    pub buffer_size: u32,
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_port: "system:capture_1".to_string(),
            output_left_port: "system:playback_1".to_string(),
            output_right_port: "system:playback_2".to_string(),
            buffer_size: 128,
            sample_rate: 48000,
        }
    }
}

/// What was loaded when the program last ran, so the next run can pick
/// up the same model and IR without being told.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub last_model_path: String,
    pub last_model_name: String,
    pub model_search_dir: String,
    pub last_ir_path: String,
    pub last_ir_name: String,
    pub ir_search_dir: String,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            last_model_path: NULL_SENTINEL.to_string(),
            last_model_name: NULL_SENTINEL.to_string(),
            model_search_dir: NULL_SENTINEL.to_string(),
            last_ir_path: NULL_SENTINEL.to_string(),
            last_ir_name: NULL_SENTINEL.to_string(),
            ir_search_dir: NULL_SENTINEL.to_string(),
        }
    }
}

impl SessionInfo {
    pub fn set_model(&mut self, path: &Path, name: &str) {
        self.last_model_path = path.to_string_lossy().into_owned();
        self.last_model_name = name.to_string();
        if let Some(dir) = path.parent() {
            self.model_search_dir = dir.to_string_lossy().into_owned();
        }
    }

    pub fn clear_model(&mut self) {
        self.last_model_path = NULL_SENTINEL.to_string();
        self.last_model_name = NULL_SENTINEL.to_string();
    }

    pub fn set_ir(&mut self, path: &Path, name: &str) {
        self.last_ir_path = path.to_string_lossy().into_owned();
        self.last_ir_name = name.to_string();
        if let Some(dir) = path.parent() {
            self.ir_search_dir = dir.to_string_lossy().into_owned();
        }
    }

    pub fn clear_ir(&mut self) {
        self.last_ir_path = NULL_SENTINEL.to_string();
        self.last_ir_name = NULL_SENTINEL.to_string();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub session: SessionInfo,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;

        writeln!(f, "Audio Settings:")?;
        writeln!(f, "{}", self.audio)?;

        writeln!(f, "Session:")?;
        writeln!(f, "Last Model: {}", self.session.last_model_name)?;
        writeln!(f, "Last IR: {}", self.session.last_ir_name)?;
        Ok(())
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path();

        if settings_path.exists() {
            let contents =
                fs::read_to_string(&settings_path).context("Failed to read settings file")?;
            let settings: Settings =
                serde_json::from_str(&contents).context("Failed to parse settings")?;
            debug!("Loaded settings from {:?}", settings_path);
            Ok(settings)
        } else {
            info!("No settings file found, using defaults");
            let settings = Settings::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save();
            Ok(settings)
        }
    }

    pub fn save(&self) -> Result<()> {
        let settings_path = Self::get_settings_path();

        // Ensure the config directory exists
        if let Some(parent) = settings_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(&settings_path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {:?}", settings_path);
        Ok(())
    }

    fn get_settings_path() -> PathBuf {
        const SETTINGS_FILENAME: &str = "settings.json";

        // Try to use XDG config directory on Linux
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("namhost")
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("namhost")
                .join(SETTINGS_FILENAME)
        } else {
            // Fallback to current directory
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }

    /// Half the deal of working with PipeWire JACK is setting the right environment variables
    pub fn apply_to_environment(&self) {
        unsafe {
            // Try and configure PipeWire JACK settings
            std::env::set_var("PIPEWIRE_LATENCY", self.get_pipewire_latency());
            if std::env::var("JACK_PROMISCUOUS_SERVER").is_err() {
                std::env::set_var("JACK_PROMISCUOUS_SERVER", "pipewire");
            }
        }
    }

    fn get_pipewire_latency(&self) -> String {
        format!("{}/{}", self.audio.buffer_size, self.audio.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults_to_null_sentinels() {
        let session = SessionInfo::default();
        assert_eq!(session.last_model_path, NULL_SENTINEL);
        assert_eq!(session.last_ir_path, NULL_SENTINEL);
    }

    #[test]
    fn set_and_clear_model_roundtrip() {
        let mut session = SessionInfo::default();
        session.set_model(Path::new("/tmp/amps/clean.nam"), "clean");
        assert_eq!(session.last_model_path, "/tmp/amps/clean.nam");
        assert_eq!(session.last_model_name, "clean");
        assert_eq!(session.model_search_dir, "/tmp/amps");

        session.clear_model();
        assert_eq!(session.last_model_path, NULL_SENTINEL);
        // Search dir survives a clear so the next file dialog starts there
        assert_eq!(session.model_search_dir, "/tmp/amps");
    }

    #[test]
    fn settings_serialize_roundtrip() {
        let mut settings = Settings::default();
        settings.session.set_ir(Path::new("/tmp/irs/412.wav"), "412");

        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session.last_ir_name, "412");
        assert_eq!(back.audio.input_port, settings.audio.input_port);
    }
}
