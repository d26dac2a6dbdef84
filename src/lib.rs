//! anki-tts - reads Anki flashcards aloud
//!
//! Extracts speakable text from the card on screen and speaks it through a
//! tiered set of voices: a networked neural voice, a local neural voice, and
//! the operating system's own voice, falling back down the list as needed.

pub mod error;
pub mod extract;
pub mod platform;
pub mod speech;
pub mod state;
pub mod symbols;
pub mod watcher;

pub use error::{AnkiTtsError, Result};
pub use extract::{extract, CardSide, ClozeReference};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "anki-tts";
