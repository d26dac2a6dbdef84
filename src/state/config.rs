//! Configuration management

use crate::speech::backends::edge::DEFAULT_VOICE;
use crate::speech::backends::piper;
use crate::speech::dispatcher::{clamp_speed, DEFAULT_SPEED};
use crate::speech::SpeechConfig;
use crate::{AnkiTtsError, Result};
use ini::Ini;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ANKICONNECT_URL: &str = "http://127.0.0.1:8765";

/// Settings for card reading
///
/// Read from `<config dir>/anki-tts/config.ini`. Missing keys (or a missing
/// file) fall back to built-in defaults; nothing is ever written back.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Where the settings were read from (or would be)
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_ini(Self::default_config())
    }
}

impl Config {
    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or use defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(path)
                .map_err(|e| AnkiTtsError::IniParse(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default_config()
        };

        Ok(Self {
            ini,
            path: path.to_path_buf(),
        })
    }

    /// Wrap already-parsed settings
    pub fn from_ini(ini: Ini) -> Self {
        Self {
            ini,
            path: Self::config_path(),
        }
    }

    /// Get config file path (`<config dir>/anki-tts/config.ini`)
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::APP_NAME)
            .join("config.ini")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("speech"))
            .set("enabled", "true")
            .set("speak_question", "true")
            .set("speak_answer", "false")
            .set("speed", DEFAULT_SPEED.to_string())
            .set("fallback_to_system", "true")
            .set("voice", DEFAULT_VOICE);

        ini.with_section(Some("piper")).set("binary", "piper");

        ini.with_section(Some("ankiconnect"))
            .set("url", DEFAULT_ANKICONNECT_URL)
            .set("poll_interval_ms", "100")
            .set("timeout_ms", "1000");

        ini
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// Get an integer value from config
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_millis(&self, section: &str, key: &str, default: u64) -> Duration {
        let ms = self.get_int(section, key, default as i64);
        Duration::from_millis(if ms > 0 { ms as u64 } else { default })
    }

    /// Master switch
    pub fn enabled(&self) -> bool {
        self.get_bool("speech", "enabled", true)
    }

    /// Read the question when it is shown
    pub fn speak_question(&self) -> bool {
        self.get_bool("speech", "speak_question", true)
    }

    /// Read the answer when it is shown
    pub fn speak_answer(&self) -> bool {
        self.get_bool("speech", "speak_answer", false)
    }

    /// Speed multiplier, clamped to 0.5..=2.0
    pub fn speed(&self) -> f32 {
        clamp_speed(self.get_float("speech", "speed", DEFAULT_SPEED))
    }

    /// May the operating-system voice be used as the last tier?
    pub fn fallback_to_system(&self) -> bool {
        self.get_bool("speech", "fallback_to_system", true)
    }

    /// Networked voice id
    pub fn voice(&self) -> String {
        self.get_string("speech", "voice", DEFAULT_VOICE)
    }

    pub fn piper_binary(&self) -> String {
        self.get_string("piper", "binary", "piper")
    }

    /// Piper voice model; defaults to the shared data directory
    pub fn piper_model(&self) -> PathBuf {
        self.ini
            .get_from(Some("piper"), "model")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(piper::default_model_path)
    }

    pub fn ankiconnect_url(&self) -> String {
        self.get_string("ankiconnect", "url", DEFAULT_ANKICONNECT_URL)
    }

    /// Delay between reviewer polls
    pub fn poll_interval(&self) -> Duration {
        self.get_millis("ankiconnect", "poll_interval_ms", 100)
    }

    /// Timeout for one AnkiConnect request
    pub fn request_timeout(&self) -> Duration {
        self.get_millis("ankiconnect", "timeout_ms", 1000)
    }

    /// Per-utterance settings for the dispatcher
    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig::new(self.speed(), self.fallback_to_system())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        Config::from_ini(Ini::load_from_str(text).expect("valid ini"))
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.enabled());
        assert!(config.speak_question());
        assert!(!config.speak_answer());
        assert_eq!(config.speed(), 1.5);
        assert!(config.fallback_to_system());
        assert_eq!(config.voice(), "en-GB-RyanNeural");
        assert_eq!(config.piper_binary(), "piper");
        assert_eq!(config.ankiconnect_url(), DEFAULT_ANKICONNECT_URL);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.request_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_speed_is_clamped() {
        assert_eq!(config("[speech]\nspeed = 9\n").speed(), 2.0);
        assert_eq!(config("[speech]\nspeed = 0.1\n").speed(), 0.5);
        assert_eq!(config("[speech]\nspeed = fast\n").speed(), 1.5);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = config("[speech]\nspeak_answer = true\n");
        assert!(config.speak_answer());
        assert!(config.speak_question());
        assert_eq!(config.voice(), DEFAULT_VOICE);
        assert!(config.piper_model().ends_with(piper::MODEL_FILE));
    }

    #[test]
    fn test_bad_durations_fall_back() {
        let config = config("[ankiconnect]\npoll_interval_ms = -5\ntimeout_ms = soon\n");
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.request_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_speech_config() {
        let speech = config("[speech]\nspeed = 1.0\nfallback_to_system = false\n").speech_config();
        assert_eq!(speech.speed, 1.0);
        assert!(!speech.fallback_to_system);
    }
}
