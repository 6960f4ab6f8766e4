//! Sink for messages that could not be delivered.

use std::sync::atomic::{AtomicUsize, Ordering};

use cadre_core::ActorId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use parking_lot::Mutex;

use crate::mailbox::Envelope;

/// Record of a message that reached no actor.
///
/// Payloads are not cloneable, so only the message's metadata is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Intended recipient
    pub recipient: ActorId,
    /// Sender, when the envelope carried one
    pub sender: Option<ActorId>,
    /// Type name of the payload
    pub message_type: &'static str,
}

/// Collects undeliverable messages and fans them out to subscribers.
#[derive(Debug, Default)]
pub struct DeadLetters {
    count: AtomicUsize,
    subscribers: Mutex<Vec<Sender<DeadLetter>>>,
}

impl DeadLetters {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an envelope addressed to `recipient` that was not delivered.
    pub fn publish(&self, recipient: ActorId, envelope: Envelope) {
        let letter = DeadLetter {
            recipient,
            sender: envelope.sender().map(|s| s.id()),
            message_type: envelope.type_name(),
        };
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Dead letter #{} to {}: {}",
            count, letter.recipient, letter.message_type
        );

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| subscriber.send(letter.clone()).is_ok());
    }

    /// Receive every dead letter published from now on.
    pub fn subscribe(&self) -> Receiver<DeadLetter> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Number of dead letters published so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}
