//! Review session state
//!
//! A `ReviewSession` owns the settings and the speech dispatcher for one
//! review session and turns reviewer events into speech.

pub mod config;

use crate::extract::{extract, CardSide, ClozeReference};
use crate::speech::{Dispatcher, Notifier};
use config::Config;
use log::{debug, info};

/// Something the reviewer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardEvent {
    /// A new question is on screen
    QuestionShown {
        html: String,
        /// Zero-based card ordinal, for cloze notes
        cloze_ordinal: Option<u32>,
    },
    /// The answer was revealed; `html` is the full answer side
    AnswerShown {
        html: String,
        cloze_ordinal: Option<u32>,
    },
    /// The reviewer closed
    SessionEnded,
}

/// Settings plus speech for one review session
pub struct ReviewSession {
    config: Config,
    dispatcher: Dispatcher,
}

impl ReviewSession {
    /// Session speaking through the standard tiers
    pub fn new(config: Config, notifier: Notifier) -> Self {
        let dispatcher = Dispatcher::new(&config, notifier);
        Self::with_dispatcher(config, dispatcher)
    }

    pub fn with_dispatcher(config: Config, dispatcher: Dispatcher) -> Self {
        info!(
            "Review session started (speed {}x, system fallback {})",
            config.speed(),
            config.fallback_to_system()
        );
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// React to a reviewer event
    ///
    /// Returns the text handed to the dispatcher, if anything was spoken.
    pub fn handle(&self, event: CardEvent) -> Option<String> {
        match event {
            CardEvent::QuestionShown { html, cloze_ordinal } => {
                if !self.config.enabled() || !self.config.speak_question() {
                    return None;
                }
                // A new card silences the previous one even if this one has nothing to say
                self.dispatcher.stop();
                self.speak(&html, CardSide::Question, cloze_ordinal)
            }
            CardEvent::AnswerShown { html, cloze_ordinal } => {
                if !self.config.enabled() || !self.config.speak_answer() {
                    return None;
                }
                self.speak(&html, CardSide::Answer, cloze_ordinal)
            }
            CardEvent::SessionEnded => {
                info!("Review session ended");
                self.dispatcher.stop();
                // A new session gets a fresh chance at every tier
                self.dispatcher.reset_all_tiers();
                None
            }
        }
    }

    fn speak(&self, html: &str, side: CardSide, cloze_ordinal: Option<u32>) -> Option<String> {
        let text = extract(html, side, cloze_ordinal.map(ClozeReference::from_ordinal));
        if text.is_empty() {
            debug!("Nothing speakable on the {:?} side", side);
            return None;
        }

        self.dispatcher.speak(&text, &self.config.speech_config());
        Some(text)
    }
}
