//! Reviewer watcher over the AnkiConnect plugin API
//!
//! Anki exposes the card on screen through AnkiConnect's `guiCurrentCard`
//! action. The watcher polls it and turns changes into `CardEvent`s: a new
//! card id is a new question, and the card disappearing ends the session.

use crate::state::config::Config;
use crate::state::CardEvent;
use crate::{AnkiTtsError, Result};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Protocol version sent with every request
pub const ANKICONNECT_VERSION: u32 = 6;

/// Delay between attempts while Anki isn't reachable
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// The card the reviewer is showing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCard {
    pub card_id: i64,
    /// Rendered question side
    pub question: String,
    /// Rendered answer side (question part included, separated by the answer marker)
    pub answer: String,
    #[serde(default)]
    pub deck_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// AnkiConnect's response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<String>,
}

/// Parse a `guiCurrentCard` response; `None` means no card is on screen
pub fn parse_current_card(body: &str) -> Result<Option<CurrentCard>> {
    let envelope: Envelope<CurrentCard> = serde_json::from_str(body)?;
    if let Some(error) = envelope.error {
        return Err(AnkiTtsError::AnkiConnect(error));
    }
    Ok(envelope.result)
}

/// Blocking client for the local AnkiConnect server
pub struct AnkiConnect {
    client: reqwest::blocking::Client,
    url: String,
}

impl AnkiConnect {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.ankiconnect_url(), config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The card currently in the reviewer, if any
    pub fn current_card(&self) -> Result<Option<CurrentCard>> {
        let body = self
            .client
            .post(&self.url)
            .json(&json!({
                "action": "guiCurrentCard",
                "version": ANKICONNECT_VERSION,
            }))
            .send()?
            .error_for_status()?
            .text()?;

        parse_current_card(&body)
    }
}

/// Turns successive reviewer snapshots into card events
pub struct Watcher {
    client: AnkiConnect,
    poll_interval: Duration,
    last_card: Option<i64>,
    /// Anki was unreachable on the last poll
    disconnected: bool,
}

impl Watcher {
    pub fn new(client: AnkiConnect, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            last_card: None,
            disconnected: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(AnkiConnect::from_config(config)?, config.poll_interval()))
    }

    /// How long to wait before the next poll
    pub fn poll_interval(&self) -> Duration {
        if self.disconnected {
            RECONNECT_DELAY
        } else {
            self.poll_interval
        }
    }

    /// Ask Anki what's on screen and report what changed
    pub fn poll(&mut self) -> Option<CardEvent> {
        match self.client.current_card() {
            Ok(card) => {
                if self.disconnected {
                    info!("Connected to Anki at {}", self.client.url());
                    self.disconnected = false;
                }
                self.observe(card)
            }
            Err(e) => self.connection_lost(&e),
        }
    }

    /// Compare a snapshot with the previous one
    pub fn observe(&mut self, card: Option<CurrentCard>) -> Option<CardEvent> {
        match card {
            Some(card) if self.last_card != Some(card.card_id) => {
                debug!(
                    "Card {} shown (deck {:?}, note type {:?})",
                    card.card_id, card.deck_name, card.model_name
                );
                self.last_card = Some(card.card_id);
                Some(CardEvent::QuestionShown {
                    html: card.question,
                    cloze_ordinal: None,
                })
            }
            Some(_) => None,
            None => self.end_session(),
        }
    }

    /// An unreachable Anki also ends any session in progress
    pub fn connection_lost(&mut self, err: &AnkiTtsError) -> Option<CardEvent> {
        if !self.disconnected {
            info!("Waiting for Anki at {} ({})", self.client.url(), err);
            self.disconnected = true;
        }
        self.end_session()
    }

    fn end_session(&mut self) -> Option<CardEvent> {
        self.last_card.take().map(|_| CardEvent::SessionEnded)
    }
}
