//! Configuration loading tests
//!
//! Tests that settings load from an INI file and fall back to the
//! expected defaults

use anki_tts::state::config::Config;
use anki_tts::AnkiTtsError;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".ini")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        "[speech]
enabled = true
speak_question = false
speak_answer = true
speed = 1.25
fallback_to_system = false
voice = en-US-JennyNeural

[piper]
binary = /opt/piper/piper
model = /opt/piper/voice.onnx

[ankiconnect]
url = http://localhost:9999
poll_interval_ms = 250
timeout_ms = 2000
",
    );

    let config = Config::load_from(file.path()).expect("config loads");
    assert_eq!(config.path(), file.path());
    assert!(config.enabled());
    assert!(!config.speak_question());
    assert!(config.speak_answer());
    assert_eq!(config.speed(), 1.25);
    assert!(!config.fallback_to_system());
    assert_eq!(config.voice(), "en-US-JennyNeural");
    assert_eq!(config.piper_binary(), "/opt/piper/piper");
    assert_eq!(config.piper_model(), PathBuf::from("/opt/piper/voice.onnx"));
    assert_eq!(config.ankiconnect_url(), "http://localhost:9999");
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.request_timeout(), Duration::from_secs(2));

    let speech = config.speech_config();
    assert_eq!(speech.speed, 1.25);
    assert!(!speech.fallback_to_system);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.ini");

    let config = Config::load_from(&path).expect("defaults load");
    assert!(config.enabled());
    assert!(config.speak_question());
    assert!(!config.speak_answer());
    assert_eq!(config.speed(), 1.5);
    assert!(config.fallback_to_system());

    // Settings are never written back
    assert!(!path.exists());
}

#[test]
fn test_unparseable_file_is_an_error() {
    let file = write_config("[speech\nspeed = 1.0\n");
    let result = Config::load_from(file.path());
    assert!(matches!(result, Err(AnkiTtsError::IniParse(_))));
}

#[test]
fn test_default_path() {
    let path = Config::config_path();
    assert!(path.ends_with("anki-tts/config.ini"));
}
