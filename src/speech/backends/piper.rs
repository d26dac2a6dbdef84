//! Local neural voice using the Piper engine
//!
//! Piper runs as an external process: text on stdin, WAV out to a file.
//! The voice model is fetched separately; until it is present (and not
//! truncated) the tier reports "not ready" and is retried on later calls.

use crate::speech::{BackendTier, Cancellation, TierProvider, Utterance, Voice};
use crate::{AnkiTtsError, Result};
use log::{debug, info, warn};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often a running synthesis checks whether it was superseded
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Default voice model file name
pub const MODEL_FILE: &str = "en_GB-alan-medium.onnx";

/// Anything smaller is a truncated download
pub const MIN_MODEL_SIZE: u64 = 1_000_000;

/// Where the model is expected unless configured otherwise
pub fn default_model_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_NAME)
        .join("voices")
        .join(MODEL_FILE)
}

/// Piper's speed knob is a duration scale: lower is faster
pub fn length_scale(speed: f32) -> f32 {
    if speed > 0.0 {
        1.0 / speed
    } else {
        1.0
    }
}

/// True if the model exists and isn't truncated
pub fn is_model_available(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > MIN_MODEL_SIZE)
        .unwrap_or(false)
}

/// Run `command` with `input` on stdin until it exits or `cancel` fires
///
/// Returns the exit status and whatever the process wrote to stderr. A
/// cancelled process is killed and reaped before `Cancelled` is returned.
fn run_cancellable(
    command: &mut Command,
    input: &str,
    cancel: &Cancellation,
) -> Result<(ExitStatus, String)> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain stderr off-thread so a chatty process can't block on a full pipe
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        })
    });

    if let Some(mut stdin) = child.stdin.take() {
        let written = stdin
            .write_all(input.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"));
        if let Err(e) = written {
            warn!("Could not send text to synthesizer: {}", e);
        }
    }

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            debug!("Synthesis superseded, killing pid {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
            return Err(AnkiTtsError::Cancelled);
        }
        thread::sleep(CANCEL_POLL);
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();
    Ok((status, stderr))
}

/// Provider for the local neural tier
pub struct PiperProvider {
    binary: String,
    model: PathBuf,
}

impl PiperProvider {
    pub fn new(binary: &str, model: PathBuf) -> Self {
        Self {
            binary: binary.to_string(),
            model,
        }
    }

    fn binary_responds(&self) -> bool {
        Command::new(&self.binary)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl TierProvider for PiperProvider {
    fn tier(&self) -> BackendTier {
        BackendTier::LocalNeural
    }

    fn acquire(&self) -> Result<Arc<dyn Voice>> {
        if !is_model_available(&self.model) {
            return Err(AnkiTtsError::BackendNotReady {
                tier: BackendTier::LocalNeural,
                reason: format!("voice model not downloaded yet ({})", self.model.display()),
            });
        }

        if !self.binary_responds() {
            return Err(AnkiTtsError::BackendUnavailable {
                tier: BackendTier::LocalNeural,
                reason: format!("{} not found", self.binary),
            });
        }

        info!("Piper voice ready: {}", self.model.display());
        Ok(Arc::new(PiperVoice {
            binary: self.binary.clone(),
            model: self.model.clone(),
        }))
    }
}

struct PiperVoice {
    binary: String,
    model: PathBuf,
}

impl PiperVoice {
    fn failure(reason: String) -> AnkiTtsError {
        AnkiTtsError::BackendFailure {
            tier: BackendTier::LocalNeural,
            reason,
        }
    }
}

impl Voice for PiperVoice {
    fn render(&self, text: &str, speed: f32, cancel: &Cancellation) -> Result<Utterance> {
        let file = tempfile::Builder::new()
            .prefix("anki-tts-")
            .suffix(".wav")
            .tempfile()?;

        let scale = length_scale(speed);
        debug!("Running piper with length scale {:.3}", scale);

        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(&self.model)
            .arg("--length_scale")
            .arg(format!("{:.3}", scale))
            .arg("--output_file")
            .arg(file.path());

        let (status, stderr) = match run_cancellable(&mut command, text, cancel) {
            Err(AnkiTtsError::Io(e)) => {
                return Err(Self::failure(format!("failed to start {}: {}", self.binary, e)))
            }
            other => other?,
        };
        if !status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map_or_else(|| status.to_string(), |line| line.trim().to_string());
            return Err(Self::failure(reason));
        }

        let size = fs::metadata(file.path()).map(|meta| meta.len()).unwrap_or(0);
        if size == 0 {
            return Err(Self::failure("no audio produced".to_string()));
        }

        Ok(Utterance::Audio(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_scale() {
        assert_eq!(length_scale(1.0), 1.0);
        assert_eq!(length_scale(2.0), 0.5);
        assert_eq!(length_scale(0.5), 2.0);
        assert_eq!(length_scale(0.0), 1.0);
    }

    #[test]
    fn test_model_availability() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(MODEL_FILE);
        assert!(!is_model_available(&path));

        // Truncated download
        fs::write(&path, vec![0u8; 1024]).expect("write model");
        assert!(!is_model_available(&path));

        fs::write(&path, vec![0u8; (MIN_MODEL_SIZE + 1) as usize]).expect("write model");
        assert!(is_model_available(&path));
    }

    #[test]
    fn test_missing_model_is_not_ready() {
        let provider = PiperProvider::new("piper", PathBuf::from("/nonexistent/model.onnx"));
        let result = provider.acquire();
        assert!(matches!(result, Err(AnkiTtsError::BackendNotReady { .. })));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(MODEL_FILE);
        fs::write(&path, vec![0u8; (MIN_MODEL_SIZE + 1) as usize]).expect("write model");

        let provider = PiperProvider::new("definitely-not-piper-binary", path);
        let result = provider.acquire();
        assert!(matches!(result, Err(AnkiTtsError::BackendUnavailable { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_superseded_synthesis_is_killed() {
        let started = std::time::Instant::now();
        let mut command = Command::new("sleep");
        command.arg("30");

        let result = run_cancellable(&mut command, "hello", &Cancellation::new(|| true));
        assert!(matches!(result, Err(AnkiTtsError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_collects_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "cat >/dev/null; echo 'bad model' >&2; exit 3"]);

        let (status, stderr) =
            run_cancellable(&mut command, "hello", &Cancellation::never()).expect("runs");
        assert!(!status.success());
        assert_eq!(stderr.trim(), "bad model");
    }

    #[test]
    fn test_default_model_path() {
        assert!(default_model_path().ends_with(Path::new("voices").join(MODEL_FILE)));
    }
}
