//! Concrete speech backends, one per tier

// Networked neural voices (Microsoft Edge read-aloud)
pub mod edge;

// Local neural voice (Piper)
pub mod piper;

// Operating-system voice
pub mod system;

use crate::platform::Platform;
use crate::speech::TierProvider;
use crate::state::config::Config;

/// Build the standard tier chain from configuration
///
/// Nothing is loaded here; each provider acquires its engine on first use.
pub fn default_providers(config: &Config) -> Vec<Box<dyn TierProvider>> {
    vec![
        Box::new(edge::EdgeProvider::new(&config.voice())),
        Box::new(piper::PiperProvider::new(&config.piper_binary(), config.piper_model())),
        Box::new(system::SystemProvider::new(Platform::current())),
    ]
}
