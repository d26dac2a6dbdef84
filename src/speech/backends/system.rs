//! Operating-system voice, the last-resort tier
//!
//! - macOS: `say`
//! - Linux: espeak-ng (or espeak)
//! - Windows and WSL: SAPI via PowerShell
//!
//! The speaking process itself is the playback handle, so stopping it
//! silences the voice immediately.

use crate::platform::Platform;
use crate::speech::{BackendTier, Cancellation, TierProvider, Utterance, Voice};
use crate::{AnkiTtsError, Result};
use log::debug;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// `say` words per minute at 1.0x
const SAY_BASE_WPM: f32 = 200.0;

/// espeak words per minute at 1.0x
const ESPEAK_BASE_WPM: f32 = 175.0;

pub fn say_rate(speed: f32) -> u32 {
    (SAY_BASE_WPM * speed) as u32
}

pub fn espeak_rate(speed: f32) -> u32 {
    (ESPEAK_BASE_WPM * speed) as u32
}

/// SAPI rate runs -10..10 with 0 as normal
pub fn sapi_rate(speed: f32) -> i32 {
    (((speed - 1.0) * 5.0) as i32).clamp(-10, 10)
}

/// Provider for the system voice tier
pub struct SystemProvider {
    platform: Platform,
}

impl SystemProvider {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Find espeak-ng or espeak
    fn find_espeak() -> Option<String> {
        let candidates = ["espeak-ng", "espeak", "/usr/bin/espeak-ng", "/usr/bin/espeak"];

        candidates
            .iter()
            .find(|path| {
                Command::new(path)
                    .arg("--version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .map(|status| status.success())
                    .unwrap_or(false)
            })
            .map(|path| path.to_string())
    }

    fn unavailable(reason: &str) -> AnkiTtsError {
        AnkiTtsError::BackendUnavailable {
            tier: BackendTier::SystemVoice,
            reason: reason.to_string(),
        }
    }
}

impl TierProvider for SystemProvider {
    fn tier(&self) -> BackendTier {
        BackendTier::SystemVoice
    }

    fn acquire(&self) -> Result<Arc<dyn Voice>> {
        let voice = match self.platform {
            Platform::MacOs => SystemVoice::Say,
            Platform::Linux => match Self::find_espeak() {
                Some(path) => SystemVoice::Espeak(path),
                None => {
                    return Err(Self::unavailable(
                        "espeak-ng not found (install: sudo apt install espeak-ng)",
                    ))
                }
            },
            Platform::Windows => SystemVoice::Sapi("powershell".to_string()),
            Platform::Wsl => SystemVoice::Sapi("powershell.exe".to_string()),
            Platform::Other => return Err(Self::unavailable("no system voice on this platform")),
        };
        debug!("System voice: {:?}", voice);
        Ok(Arc::new(voice))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SystemVoice {
    Say,
    Espeak(String),
    /// PowerShell executable name
    Sapi(String),
}

impl SystemVoice {
    fn command(&self, text: &str, speed: f32) -> Command {
        match self {
            SystemVoice::Say => {
                let mut cmd = Command::new("say");
                // `--` so text such as "-3 degrees" isn't read as an option
                cmd.arg("-r")
                    .arg(say_rate(speed).to_string())
                    .arg("--")
                    .arg(text);
                cmd
            }
            SystemVoice::Espeak(path) => {
                let mut cmd = Command::new(path);
                cmd.arg("-s")
                    .arg(espeak_rate(speed).to_string())
                    .arg("--")
                    .arg(text);
                cmd
            }
            SystemVoice::Sapi(powershell) => {
                let script = format!(
                    "Add-Type -AssemblyName System.Speech;\
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer;\
                     $s.Rate = {};\
                     $s.Speak('{}');",
                    sapi_rate(speed),
                    text.replace('\'', "''")
                );
                let mut cmd = Command::new(powershell);
                cmd.arg("-NoProfile").arg("-Command").arg(script);
                cmd
            }
        }
    }
}

impl Voice for SystemVoice {
    fn render(&self, text: &str, speed: f32, _cancel: &Cancellation) -> Result<Utterance> {
        Ok(Utterance::Command(self.command(text, speed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_rate_conversion() {
        assert_eq!(say_rate(1.0), 200);
        assert_eq!(say_rate(1.5), 300);
        assert_eq!(espeak_rate(1.0), 175);
        assert_eq!(espeak_rate(2.0), 350);
        assert_eq!(sapi_rate(1.0), 0);
        assert_eq!(sapi_rate(1.5), 2);
        assert_eq!(sapi_rate(0.5), -2);
        assert_eq!(sapi_rate(10.0), 10);
    }

    #[test]
    fn test_say_command() {
        let cmd = SystemVoice::Say.command("hello", 1.5);
        assert_eq!(cmd.get_program(), "say");
        assert_eq!(args(&cmd), vec!["-r", "300", "--", "hello"]);
    }

    #[test]
    fn test_espeak_command() {
        let cmd = SystemVoice::Espeak("espeak-ng".to_string()).command("hello", 1.0);
        assert_eq!(args(&cmd), vec!["-s", "175", "--", "hello"]);
    }

    #[test]
    fn test_dash_leading_text_is_not_an_option() {
        let text = "-3 is less than 0";
        let cmd = SystemVoice::Espeak("espeak-ng".to_string()).command(text, 1.0);
        assert_eq!(args(&cmd), vec!["-s", "175", "--", text]);

        let cmd = SystemVoice::Say.command("--help me", 1.0);
        assert_eq!(args(&cmd), vec!["-r", "200", "--", "--help me"]);
    }

    #[test]
    fn test_sapi_escapes_quotes() {
        let cmd = SystemVoice::Sapi("powershell".to_string()).command("it's", 1.0);
        let script = args(&cmd).pop().expect("script argument");
        assert!(script.contains("$s.Speak('it''s');"));
        assert!(script.contains("$s.Rate = 0;"));
    }

    #[test]
    fn test_other_platform_unavailable() {
        let provider = SystemProvider::new(Platform::Other);
        assert!(matches!(
            provider.acquire(),
            Err(AnkiTtsError::BackendUnavailable { .. })
        ));
    }
}
