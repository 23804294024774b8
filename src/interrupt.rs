//! Interrupt delivery for the interactive session.
//!
//! Interrupts are counted on a `watch` channel.  Every clone of an
//! [`InterruptSignal`] observes every interrupt, and [`InterruptSignal::arm`]
//! marks everything delivered so far as seen so that a stale Ctrl-C never
//! ends a later wait.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};

/// A cloneable handle on the process interrupt.
#[derive(Clone, Debug)]
pub struct InterruptSignal {
    sender: Arc<watch::Sender<u64>>,
    receiver: watch::Receiver<u64>,
}

impl InterruptSignal {
    /// Creates a signal that only fires through [`InterruptSignal::trigger`].
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Creates a signal wired to Ctrl-C (and SIGTERM).
    ///
    /// The handler is process-wide, so this can succeed only once per process.
    pub fn install() -> Result<Self> {
        let signal = Self::new();
        let handler = signal.clone();
        ctrlc::set_handler(move || handler.trigger()).map_err(|err| {
            Error::configuration(format!("cannot install interrupt handler: {err}"))
        })?;
        Ok(signal)
    }

    /// Delivers an interrupt to every clone of this signal.
    pub fn trigger(&self) {
        self.sender.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// Forgets every interrupt delivered before now.
    pub fn arm(&mut self) {
        self.receiver.borrow_and_update();
    }

    /// Returns true if an interrupt arrived since the last `arm`.
    pub fn is_pending(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Waits for the next interrupt and consumes it.
    ///
    /// This future is cancel-safe; dropping it deregisters the wait.
    pub async fn interrupted(&mut self) {
        // The sender lives as long as `self`, so `changed` cannot fail.
        if self.receiver.changed().await.is_ok() {
            self.receiver.borrow_and_update();
        }
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}
