//! Speech dispatcher
//!
//! Picks a backend tier for each utterance and owns the single in-flight
//! playback handle. `speak` returns immediately; the work happens on a
//! background thread. Every new request preempts the previous one.
//!
//! Tier selection is sticky-skip: a tier that fails permanently (or a
//! networked tier that fails mid-utterance) is skipped on later calls until
//! it is explicitly reset.

use crate::platform::Platform;
use crate::speech::backends;
use crate::speech::playback::{player_command, Playback, STOP_GRACE};
use crate::speech::{
    BackendTier, Cancellation, Notifier, TierProvider, TierState, Utterance, Voice,
};
use crate::state::config::Config;
use crate::AnkiTtsError;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;
pub const DEFAULT_SPEED: f32 = 1.5;

/// Ceiling on a single playback before it is stopped
pub const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Clamp a speed multiplier into the supported range
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        DEFAULT_SPEED
    } else {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    }
}

/// Per-utterance speech settings
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    /// Abstract multiplier; each tier maps it to its native rate
    pub speed: f32,
    /// Whether the system voice may be used
    pub fallback_to_system: bool,
}

impl SpeechConfig {
    pub fn new(speed: f32, fallback_to_system: bool) -> Self {
        Self {
            speed: clamp_speed(speed),
            fallback_to_system,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED, true)
    }
}

/// One utterance, superseded (never queued) by the next
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub speed: f32,
    pub fallback_enabled: bool,
}

impl SpeechRequest {
    pub fn new(text: &str, config: &SpeechConfig) -> Self {
        Self {
            text: text.to_string(),
            speed: clamp_speed(config.speed),
            fallback_enabled: config.fallback_to_system,
        }
    }
}

/// Dispatcher state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    /// Trying tiers in order
    Selecting,
    /// Exactly one playback handle is live
    Speaking,
    /// Waiting for a playback handle to terminate
    Stopping,
}

enum PlayOutcome {
    Played,
    /// A newer speak/stop took over
    Superseded,
    SpawnFailed(String),
}

struct TierSlot {
    state: TierState,
    voice: Option<Arc<dyn Voice>>,
    /// A not-ready acquisition has already been reported
    reported: bool,
}

impl TierSlot {
    fn new() -> Self {
        Self {
            state: TierState::Untried,
            voice: None,
            reported: false,
        }
    }
}

/// Everything mutable, behind one mutex
struct Shared {
    state: DispatcherState,
    /// Bumped by every speak/stop; background work for an older generation is abandoned
    generation: u64,
    playback: Option<Playback>,
    /// Indexed like `Inner::providers`
    tiers: Vec<TierSlot>,
}

struct Inner {
    shared: Mutex<Shared>,
    providers: Vec<Box<dyn TierProvider>>,
    notifier: Notifier,
    platform: Platform,
}

/// Speaks text through the best available tier
///
/// Owned by the review session; dropping it stops any playback.
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Dispatcher with the standard networked / local / system tiers
    pub fn new(config: &Config, notifier: Notifier) -> Self {
        Self::with_providers(backends::default_providers(config), notifier)
    }

    /// Dispatcher over an arbitrary set of tiers, tried in tier order
    pub fn with_providers(mut providers: Vec<Box<dyn TierProvider>>, notifier: Notifier) -> Self {
        providers.sort_by_key(|provider| provider.tier());
        let tiers = providers.iter().map(|_| TierSlot::new()).collect();

        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: DispatcherState::Idle,
                    generation: 0,
                    playback: None,
                    tiers,
                }),
                providers,
                notifier,
                platform: Platform::current(),
            }),
        }
    }

    /// Stop whatever is playing and speak `text` in the background
    pub fn speak(&self, text: &str, config: &SpeechConfig) {
        let text = text.trim();
        if text.is_empty() {
            self.stop();
            return;
        }

        let generation = self.inner.preempt(DispatcherState::Selecting);
        let request = SpeechRequest::new(text, config);
        debug!("Speaking {} chars at {}x", request.text.chars().count(), request.speed);

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("anki-tts-speak".to_string())
            .spawn(move || inner.run(generation, request));

        if let Err(e) = spawned {
            error!("Failed to start speech thread: {}", e);
            self.inner.finish(generation);
        }
    }

    /// Stop any in-progress speech
    ///
    /// Safe to call at any time; returns once the handle is gone.
    pub fn stop(&self) {
        self.inner.preempt(DispatcherState::Idle);
    }

    pub fn state(&self) -> DispatcherState {
        self.inner.lock().state
    }

    /// State of `tier`, or `None` if this dispatcher has no such tier
    pub fn tier_state(&self, tier: BackendTier) -> Option<TierState> {
        let index = self.inner.index_of(tier)?;
        Some(self.inner.lock().tiers[index].state)
    }

    /// Allow a failed tier to be tried again
    pub fn reset_tier(&self, tier: BackendTier) {
        if let Some(index) = self.inner.index_of(tier) {
            info!("Resetting {}", tier);
            self.inner.lock().tiers[index] = TierSlot::new();
        }
    }

    pub fn reset_all_tiers(&self) {
        let mut shared = self.inner.lock();
        for slot in shared.tiers.iter_mut() {
            *slot = TierSlot::new();
        }
    }

    /// Block until the dispatcher is idle; false on timeout
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state() == DispatcherState::Idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        debug!("Shutting down speech dispatcher");
        self.stop();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index_of(&self, tier: BackendTier) -> Option<usize> {
        self.providers.iter().position(|provider| provider.tier() == tier)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Start a new generation, terminating the live handle if any
    fn preempt(&self, next: DispatcherState) -> u64 {
        let (generation, previous) = {
            let mut shared = self.lock();
            shared.generation += 1;
            let previous = shared.playback.take();
            shared.state = if previous.is_some() {
                DispatcherState::Stopping
            } else {
                next
            };
            (shared.generation, previous)
        };

        if let Some(playback) = previous {
            debug!("Stopping {} playback", playback.tier());
            playback.terminate(STOP_GRACE);

            let mut shared = self.lock();
            if shared.generation == generation {
                shared.state = next;
            }
        }

        generation
    }

    /// Return to idle unless a newer generation has taken over
    fn finish(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation == generation {
            shared.state = DispatcherState::Idle;
        }
    }

    /// Fires once `generation` has been superseded or the dispatcher is gone
    fn cancellation(self: &Arc<Self>, generation: u64) -> Cancellation {
        let weak = Arc::downgrade(self);
        Cancellation::new(move || {
            weak.upgrade()
                .map_or(true, |inner| !inner.is_current(generation))
        })
    }

    /// Background worker for one utterance
    fn run(self: &Arc<Self>, generation: u64, request: SpeechRequest) {
        let cancel = self.cancellation(generation);
        for (index, provider) in self.providers.iter().enumerate() {
            if !self.is_current(generation) {
                return;
            }

            let tier = provider.tier();
            if tier == BackendTier::SystemVoice && !request.fallback_enabled {
                debug!("System voice fallback disabled");
                continue;
            }

            let Some(voice) = self.voice_for(index) else {
                continue;
            };

            let utterance = match voice.render(&request.text, request.speed, &cancel) {
                Ok(utterance) => utterance,
                Err(AnkiTtsError::Cancelled) => {
                    debug!("{} render abandoned for a newer request", tier);
                    return;
                }
                Err(e) => {
                    self.record_failure(index, &e);
                    continue;
                }
            };

            match self.play(generation, tier, utterance) {
                PlayOutcome::Played => {
                    debug!("Utterance spoken with {}", tier);
                    return;
                }
                PlayOutcome::Superseded => return,
                PlayOutcome::SpawnFailed(reason) => {
                    debug!("{} playback could not start: {}", tier, reason);
                }
            }
        }

        if self.is_current(generation) {
            warn!("No speech backend could speak the text");
        }
        self.finish(generation);
    }

    /// Cached voice for a tier, acquiring it on first use
    fn voice_for(&self, index: usize) -> Option<Arc<dyn Voice>> {
        {
            let shared = self.lock();
            let slot = &shared.tiers[index];
            match slot.state {
                TierState::FailedSticky => return None,
                TierState::Available => {
                    if let Some(voice) = &slot.voice {
                        return Some(Arc::clone(voice));
                    }
                }
                TierState::Untried => {}
            }
        }

        // Acquisition may be slow; don't hold the lock
        let provider = &self.providers[index];
        let tier = provider.tier();
        match provider.acquire() {
            Ok(voice) => {
                info!("{} ready", tier);
                let mut shared = self.lock();
                let slot = &mut shared.tiers[index];
                slot.state = TierState::Available;
                slot.voice = Some(Arc::clone(&voice));
                slot.reported = false;
                Some(voice)
            }
            Err(e @ AnkiTtsError::BackendNotReady { .. }) => {
                let first = {
                    let mut shared = self.lock();
                    !std::mem::replace(&mut shared.tiers[index].reported, true)
                };
                if first {
                    self.notifier
                        .notify(&format!("{} not ready ({}), using the next voice", tier, e.reason()));
                } else {
                    debug!("{}", e);
                }
                None
            }
            Err(e) => {
                warn!("Failed to load {}: {}", tier, e);
                {
                    let mut shared = self.lock();
                    let slot = &mut shared.tiers[index];
                    slot.state = TierState::FailedSticky;
                    slot.voice = None;
                }
                self.notify_fallback(tier, &e);
                None
            }
        }
    }

    fn record_failure(&self, index: usize, err: &AnkiTtsError) {
        let provider = &self.providers[index];
        let tier = provider.tier();
        warn!("{} failed, switching to the next voice: {}", tier, err);

        if provider.sticky_on_failure() {
            let mut shared = self.lock();
            let slot = &mut shared.tiers[index];
            slot.state = TierState::FailedSticky;
            slot.voice = None;
        }
        self.notify_fallback(tier, err);
    }

    fn notify_fallback(&self, tier: BackendTier, err: &AnkiTtsError) {
        let message = match tier {
            BackendTier::Networked => {
                format!("{} unavailable ({}), using offline voice", tier, err.reason())
            }
            _ => format!("{} unavailable ({}), using the next voice", tier, err.reason()),
        };
        self.notifier.notify(&message);
    }

    /// Spawn playback, register it, and wait for it to end
    fn play(&self, generation: u64, tier: BackendTier, utterance: Utterance) -> PlayOutcome {
        let (command, audio) = match utterance {
            Utterance::Command(command) => (command, None),
            Utterance::Audio(file) => match player_command(file.path(), self.platform) {
                Some(command) => (command, Some(file)),
                None => return PlayOutcome::SpawnFailed("no audio player for this platform".to_string()),
            },
        };

        let playback = match Playback::spawn(command, tier, audio) {
            Ok(playback) => playback,
            Err(e) => return PlayOutcome::SpawnFailed(e.to_string()),
        };

        {
            let mut shared = self.lock();
            if shared.generation != generation {
                drop(shared);
                playback.terminate(STOP_GRACE);
                return PlayOutcome::Superseded;
            }
            shared.playback = Some(playback);
            shared.state = DispatcherState::Speaking;
        }

        let deadline = Instant::now() + PLAYBACK_TIMEOUT;
        loop {
            thread::sleep(POLL_INTERVAL);

            let mut shared = self.lock();
            if shared.generation != generation {
                // stop() or a newer speak() owns the handle now
                return PlayOutcome::Superseded;
            }

            let finished = shared
                .playback
                .as_mut()
                .map_or(true, |playback| playback.has_exited());
            if finished {
                shared.playback = None;
                shared.state = DispatcherState::Idle;
                return PlayOutcome::Played;
            }

            if Instant::now() >= deadline {
                warn!("{} playback exceeded {:?}, stopping", tier, PLAYBACK_TIMEOUT);
                let playback = shared.playback.take();
                shared.state = DispatcherState::Stopping;
                drop(shared);

                if let Some(playback) = playback {
                    playback.terminate(STOP_GRACE);
                }
                self.finish(generation);
                return PlayOutcome::Played;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(0.1), MIN_SPEED);
        assert_eq!(clamp_speed(5.0), MAX_SPEED);
        assert_eq!(clamp_speed(1.2), 1.2);
        assert_eq!(clamp_speed(f32::NAN), DEFAULT_SPEED);
    }

    #[test]
    fn test_speech_request_from_config() {
        let config = SpeechConfig::new(3.0, false);
        let request = SpeechRequest::new("hello", &config);
        assert_eq!(request.speed, MAX_SPEED);
        assert!(!request.fallback_enabled);
        assert_eq!(request.text, "hello");
    }

    #[test]
    fn test_stop_when_idle() {
        let dispatcher = Dispatcher::with_providers(Vec::new(), Notifier::log_only());
        dispatcher.stop();
        dispatcher.stop();
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_speak_with_no_tiers_returns_to_idle() {
        let dispatcher = Dispatcher::with_providers(Vec::new(), Notifier::log_only());
        dispatcher.speak("nothing can say this", &SpeechConfig::default());
        assert!(dispatcher.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(dispatcher.tier_state(BackendTier::Networked), None);
    }

    #[test]
    fn test_empty_text_is_a_stop() {
        let dispatcher = Dispatcher::with_providers(Vec::new(), Notifier::log_only());
        dispatcher.speak("   ", &SpeechConfig::default());
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }
}
