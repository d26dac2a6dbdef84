//! Networked neural voices via Microsoft Edge's read-aloud service
//!
//! Synthesis happens over a websocket; the audio comes back as MP3 and is
//! written to a temp file for the platform player. The service drops idle
//! sockets, so every utterance opens its own connection. Each request runs on
//! a helper thread so a stalled connection can't hold the utterance forever.

use crate::speech::{BackendTier, Cancellation, TierProvider, Utterance, Voice};
use crate::{AnkiTtsError, Result};
use log::{debug, info, warn};
use msedge_tts::tts::client::{self, MSEdgeTTSClient};
use msedge_tts::tts::SpeechConfig as EdgeSpeechConfig;
use std::io::Write;
use std::net::TcpStream;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Voice used when the configured one is missing
pub const DEFAULT_VOICE: &str = "en-GB-RyanNeural";

/// Known English voices (label, voice id)
pub const VOICES: &[(&str, &str)] = &[
    ("Ryan (British Male)", "en-GB-RyanNeural"),
    ("Sonia (British Female)", "en-GB-SoniaNeural"),
    ("Jenny (US Female)", "en-US-JennyNeural"),
    ("Guy (US Male)", "en-US-GuyNeural"),
    ("Natasha (Australian Female)", "en-AU-NatashaNeural"),
    ("William (Australian Male)", "en-AU-WilliamNeural"),
];

const AUDIO_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Upper bound on one synthesis round trip
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a pending synthesis checks whether it was superseded
const CANCEL_POLL: Duration = Duration::from_millis(50);

type EdgeClient = MSEdgeTTSClient<TcpStream>;

/// Opens a connection to the service
type Connector = fn() -> std::result::Result<EdgeClient, String>;

fn connect_service() -> std::result::Result<EdgeClient, String> {
    client::connect().map_err(|e| e.to_string())
}

/// Card text goes into SSML, so markup characters must be escaped
pub fn ssml_text(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Relative rate in percent: 1.5x -> 50, 0.8x -> -20
pub fn rate_percent(speed: f32) -> i32 {
    ((speed - 1.0) * 100.0).round() as i32
}

/// Rate in the service's string form: "+50%", "-20%"
pub fn rate_string(speed: f32) -> String {
    let pct = rate_percent(speed);
    if pct >= 0 {
        format!("+{}%", pct)
    } else {
        format!("{}%", pct)
    }
}

pub fn is_known_voice(voice: &str) -> bool {
    VOICES.iter().any(|(_, id)| *id == voice)
}

/// Condense a service error into a short user-facing reason
pub fn condense_reason(message: &str) -> String {
    let msg = message.trim();
    let low = msg.to_lowercase();

    if low.contains("certificate verify failed") || low.contains("ssl") || low.contains("tls") {
        return "TLS/certificate error".to_string();
    }
    let network_phrases = [
        "cannot connect",
        "name or service not known",
        "temporary failure in name resolution",
        "failed to lookup address",
        "connection reset",
        "connection refused",
        "network is unreachable",
    ];
    if network_phrases.iter().any(|phrase| low.contains(phrase)) {
        return "network connection failed".to_string();
    }

    match msg.lines().next() {
        Some(first) if !first.is_empty() => first.chars().take(120).collect(),
        _ => "unknown error".to_string(),
    }
}

/// Provider for the networked tier
pub struct EdgeProvider {
    voice: String,
}

impl EdgeProvider {
    pub fn new(voice: &str) -> Self {
        let voice = if voice.trim().is_empty() {
            DEFAULT_VOICE.to_string()
        } else {
            voice.trim().to_string()
        };
        if !is_known_voice(&voice) {
            warn!("Voice {} is not in the known voice list, trying it anyway", voice);
        }
        Self { voice }
    }
}

impl TierProvider for EdgeProvider {
    fn tier(&self) -> BackendTier {
        BackendTier::Networked
    }

    fn acquire(&self) -> Result<Arc<dyn Voice>> {
        debug!("Checking the read-aloud service is reachable");
        // Only a reachability check; each utterance opens its own connection
        connect_service().map_err(|e| AnkiTtsError::BackendUnavailable {
            tier: BackendTier::Networked,
            reason: condense_reason(&e),
        })?;
        info!("Read-aloud service reachable (voice {})", self.voice);

        Ok(Arc::new(EdgeVoice::new(&self.voice, connect_service)))
    }
}

struct EdgeVoice {
    voice: String,
    connect: Connector,
}

impl EdgeVoice {
    fn new(voice: &str, connect: Connector) -> Self {
        Self {
            voice: voice.to_string(),
            connect,
        }
    }

    fn failure(reason: String) -> AnkiTtsError {
        AnkiTtsError::BackendFailure {
            tier: BackendTier::Networked,
            reason,
        }
    }

    fn synthesize(&self, text: &str, speed: f32, cancel: &Cancellation) -> Result<Vec<u8>> {
        let config = EdgeSpeechConfig {
            voice_name: self.voice.clone(),
            audio_format: AUDIO_FORMAT.to_string(),
            pitch: 0,
            rate: rate_percent(speed),
            volume: 0,
        };
        debug!("Synthesizing with {} at {}", self.voice, rate_string(speed));

        let text = ssml_text(text);
        let connect = self.connect;
        let (tx, rx) = mpsc::channel::<std::result::Result<Vec<u8>, String>>();

        thread::Builder::new()
            .name("anki-tts-edge".to_string())
            .spawn(move || {
                let result = connect().and_then(|mut client| {
                    client
                        .synthesize(&text, &config)
                        .map(|audio| audio.audio_bytes)
                        .map_err(|e| e.to_string())
                });
                let _ = tx.send(result);
            })?;

        let deadline = Instant::now() + GENERATION_TIMEOUT;
        loop {
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(message)) => return Err(Self::failure(condense_reason(&message))),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        debug!("Synthesis superseded, abandoning it");
                        return Err(AnkiTtsError::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        return Err(Self::failure(format!(
                            "no response within {}s",
                            GENERATION_TIMEOUT.as_secs()
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Self::failure("synthesis thread exited".to_string()))
                }
            }
        }
    }
}

impl Voice for EdgeVoice {
    fn render(&self, text: &str, speed: f32, cancel: &Cancellation) -> Result<Utterance> {
        let bytes = self.synthesize(text, speed, cancel)?;
        if bytes.is_empty() {
            return Err(Self::failure("service returned no audio".to_string()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("anki-tts-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;
        debug!("Wrote {} bytes of audio to {:?}", bytes.len(), file.path());

        Ok(Utterance::Audio(file))
    }
}
