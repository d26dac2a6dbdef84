//! Speech output: backend tiers, playback, and the dispatcher that picks between them

pub mod backends;
pub mod dispatcher;
pub mod notify;
pub mod playback;
pub mod tier;

pub use dispatcher::{Dispatcher, DispatcherState, SpeechConfig, SpeechRequest};
pub use notify::Notifier;
pub use tier::{BackendTier, Cancellation, TierProvider, TierState, Utterance, Voice};
