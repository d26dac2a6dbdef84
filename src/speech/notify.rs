//! Status notifications from background speech work
//!
//! Background threads never touch the presentation layer directly; they send
//! short messages over a channel that the owner drains on its own thread.

use log::{debug, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Thread-safe `notify(message)` capability
#[derive(Clone, Default)]
pub struct Notifier {
    sender: Option<Arc<Mutex<Sender<String>>>>,
}

impl Notifier {
    /// Create a notifier and the receiving end for the presentation layer
    pub fn channel() -> (Self, Receiver<String>) {
        let (sender, receiver) = mpsc::channel();
        let notifier = Self {
            sender: Some(Arc::new(Mutex::new(sender))),
        };
        (notifier, receiver)
    }

    /// A notifier that only logs
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn notify(&self, message: &str) {
        info!("{}", message);

        let Some(sender) = &self.sender else {
            return;
        };
        let sender = sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if sender.send(message.to_string()).is_err() {
            debug!("Status receiver dropped, message discarded");
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("connected", &self.sender.is_some())
            .finish()
    }
}
