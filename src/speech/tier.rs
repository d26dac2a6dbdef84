//! Backend tiers and the seam each speech engine implements

use crate::Result;
use std::fmt;
use std::process::Command;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Candidate speech backends in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendTier {
    /// Networked neural voice (best quality, needs a connection)
    Networked,
    /// Local neural voice (needs a downloaded model)
    LocalNeural,
    /// Operating-system voice (last resort)
    SystemVoice,
}

impl BackendTier {
    /// All tiers, highest priority first
    pub const ALL: [BackendTier; 3] = [
        BackendTier::Networked,
        BackendTier::LocalNeural,
        BackendTier::SystemVoice,
    ];
}

impl fmt::Display for BackendTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendTier::Networked => "Online voice",
            BackendTier::LocalNeural => "Offline voice",
            BackendTier::SystemVoice => "System voice",
        };
        f.write_str(name)
    }
}

/// Availability of one tier within a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    /// Not acquired yet, or acquisition should be retried
    Untried,
    /// Acquired and cached
    Available,
    /// Failed; skipped until explicitly reset
    FailedSticky,
}

/// Something ready to be played
#[derive(Debug)]
pub enum Utterance {
    /// Rendered audio; the file is removed once playback is over
    Audio(NamedTempFile),
    /// A process that speaks the text itself
    Command(Command),
}

/// Tells a long-running render that its utterance has been superseded
#[derive(Clone)]
pub struct Cancellation {
    check: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Cancellation {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }

    /// A token that is never cancelled
    pub fn never() -> Self {
        Self::new(|| false)
    }

    pub fn is_cancelled(&self) -> bool {
        (self.check)()
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// An acquired engine/voice/model that renders text
pub trait Voice: Send + Sync {
    /// Render `text` at `speed` (0.5x - 2.0x, 1.0 = normal)
    ///
    /// Each engine maps the abstract multiplier to its own rate parameter.
    /// Renders that take a while should poll `cancel` and return
    /// `AnkiTtsError::Cancelled` once it fires.
    fn render(&self, text: &str, speed: f32, cancel: &Cancellation) -> Result<Utterance>;
}

/// Lazily acquires the voice for one tier
pub trait TierProvider: Send + Sync {
    fn tier(&self) -> BackendTier;

    /// Load the engine. Return `BackendNotReady` when a later call may
    /// succeed, any other error when the tier is broken.
    fn acquire(&self) -> Result<Arc<dyn Voice>>;

    /// Whether a render failure should skip this tier on later calls
    fn sticky_on_failure(&self) -> bool {
        self.tier() == BackendTier::Networked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        let mut tiers = vec![
            BackendTier::SystemVoice,
            BackendTier::Networked,
            BackendTier::LocalNeural,
        ];
        tiers.sort();
        assert_eq!(tiers, BackendTier::ALL.to_vec());
    }

    #[test]
    fn test_display() {
        assert_eq!(BackendTier::Networked.to_string(), "Online voice");
        assert_eq!(BackendTier::SystemVoice.to_string(), "System voice");
    }

    #[test]
    fn test_cancellation() {
        assert!(!Cancellation::never().is_cancelled());

        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let watched = flag.clone();
        let cancel = Cancellation::new(move || watched.load(std::sync::atomic::Ordering::SeqCst));
        assert!(!cancel.is_cancelled());
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(cancel.clone().is_cancelled());
    }
}
