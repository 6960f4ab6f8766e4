//! Actor mailbox implementation for message passing.
//!
//! A mailbox owns one actor's queues: a FIFO system queue for lifecycle and
//! supervision control, and a user queue whose discipline is chosen at
//! construction. Posting a message requests a processing run from the
//! mailbox's dispatcher. The Idle/Busy compare-and-set in
//! [`Mailbox::request_scheduling`] guarantees at most one run is active at
//! any instant, so the actor behind the mailbox never processes two messages
//! concurrently.

mod envelope;
mod queue;
mod registry;

pub use envelope::{AnyMessage, Envelope, SystemMessage};
pub use queue::{BoundedQueue, MessageQueue, StackQueue, UnboundedQueue};
pub use registry::{
    MailboxRegistry, MailboxSettings, MailboxTypes, QueueFactory, DEFAULT_MAILBOX_ID,
};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use cadre_core::{ActorError, DispatchError};
use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use log::{debug, error, trace};
use thiserror::Error;

use crate::dispatch::Dispatcher;

/// Error when posting a message to a mailbox
#[derive(Error, Debug)]
pub enum MailboxError {
    /// A bounded user queue is at capacity; the message is handed back
    #[error("mailbox is full")]
    Full(Envelope),
    /// The mailbox has been closed; the message is handed back
    #[error("mailbox is closed")]
    Closed(Envelope),
    /// The message was queued but the dispatcher refused to run the mailbox
    #[error("dispatcher rejected the mailbox run: {0}")]
    Rejected(#[source] DispatchError),
}

impl MailboxError {
    /// The message that could not be queued, if any.
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Self::Full(envelope) | Self::Closed(envelope) => Some(envelope),
            Self::Rejected(_) => None,
        }
    }
}

/// Scheduling status of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MailboxStatus {
    /// No run is queued or active
    Idle = 0,
    /// A run is queued on the dispatcher or executing
    Busy = 1,
}

impl MailboxStatus {
    fn from_u8(value: u8) -> Self {
        if value == Self::Busy as u8 {
            Self::Busy
        } else {
            Self::Idle
        }
    }
}

/// The receiving side of a mailbox: what a run hands messages to.
///
/// Methods take `Arc<Self>` so an implementation can hand out owned handles
/// to itself while processing.
pub trait MessageInvoker: Send + Sync {
    /// Process one control message.
    fn invoke_system_message(self: Arc<Self>, message: SystemMessage) -> Result<(), ActorError>;

    /// Process one user message.
    fn invoke_user_message(self: Arc<Self>, envelope: Envelope) -> Result<(), ActorError>;

    /// A user message failed; route the failure to supervision.
    fn handle_failure(self: Arc<Self>, cause: ActorError);

    /// A control message failed. This is fatal to the invoker.
    fn handle_system_failure(self: Arc<Self>, cause: ActorError);

    /// A user message arrived after the mailbox closed.
    fn dead_letter(self: Arc<Self>, envelope: Envelope) {
        trace!("Dropping undeliverable {:?}", envelope);
    }
}

/// A per-actor mailbox.
pub struct Mailbox {
    label: String,
    system_sender: Sender<SystemMessage>,
    system_receiver: Receiver<SystemMessage>,
    user_queue: Box<dyn MessageQueue>,
    status: AtomicU8,
    closed: AtomicBool,
    suspended: AtomicBool,
    dispatcher: Arc<Dispatcher>,
    invoker: OnceLock<Weak<dyn MessageInvoker>>,
}

impl Mailbox {
    /// Create a mailbox that runs on `dispatcher`.
    ///
    /// The mailbox does nothing until an invoker is attached with
    /// [`Mailbox::set_invoker`].
    pub fn new(
        label: impl Into<String>,
        user_queue: Box<dyn MessageQueue>,
        dispatcher: Arc<Dispatcher>,
    ) -> Arc<Self> {
        let (system_sender, system_receiver) = unbounded();
        Arc::new(Self {
            label: label.into(),
            system_sender,
            system_receiver,
            user_queue,
            status: AtomicU8::new(MailboxStatus::Idle as u8),
            closed: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            dispatcher,
            invoker: OnceLock::new(),
        })
    }

    /// Attach the invoker. Only the first call has an effect.
    pub fn set_invoker(&self, invoker: Weak<dyn MessageInvoker>) {
        if self.invoker.set(invoker).is_err() {
            debug!("{}: invoker already attached", self.label);
        }
    }

    /// Queue an envelope and request a run.
    ///
    /// Envelopes carrying a [`SystemMessage`] go to the system queue, all
    /// others to the user queue. A closed mailbox hands the envelope back.
    pub fn post(self: &Arc<Self>, envelope: Envelope) -> Result<(), MailboxError> {
        if self.is_closed() {
            return Err(MailboxError::Closed(envelope));
        }

        match envelope.into_system() {
            Ok(message) => {
                if let Err(SendError(message)) = self.system_sender.send(message) {
                    return Err(MailboxError::Closed(Envelope::system(message)));
                }
            }
            Err(envelope) => self.user_queue.enqueue(envelope).map_err(MailboxError::Full)?,
        }

        self.request_scheduling()
            .map(|_| ())
            .map_err(MailboxError::Rejected)
    }

    /// Queue a control message and request a run.
    pub fn post_system(self: &Arc<Self>, message: SystemMessage) -> Result<(), MailboxError> {
        self.post(Envelope::system(message))
    }

    /// Submit a run to the dispatcher if there is work and no run is active.
    ///
    /// Returns `Ok(true)` when this call performed the Idle to Busy
    /// transition and submitted the run.
    pub fn request_scheduling(self: &Arc<Self>) -> Result<bool, DispatchError> {
        // Pairs producers' enqueue-then-CAS with the run's Idle-store-then-check.
        atomic::fence(Ordering::SeqCst);
        if !self.has_runnable_work() {
            return Ok(false);
        }

        if self
            .status
            .compare_exchange(
                MailboxStatus::Idle as u8,
                MailboxStatus::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(false);
        }

        let mailbox = Arc::clone(self);
        match self.dispatcher.schedule(Box::new(move || mailbox.run())) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.status
                    .store(MailboxStatus::Idle as u8, Ordering::Release);
                if self.is_closed() {
                    debug!("{}: dispatcher refused a closed mailbox: {}", self.label, e);
                } else {
                    error!("{}: dispatcher rejected run: {}", self.label, e);
                }
                Err(e)
            }
        }
    }

    /// One processing run. Called by the dispatcher.
    pub fn run(self: &Arc<Self>) {
        let invoker = match self.invoker.get() {
            Some(weak) => weak.upgrade(),
            None => {
                // Not attached yet; keep everything queued for later.
                self.status
                    .store(MailboxStatus::Idle as u8, Ordering::Release);
                return;
            }
        };

        match invoker {
            Some(invoker) => {
                self.process_all_system_messages(&invoker);
                if self.is_closed() {
                    for envelope in self.user_queue.drain() {
                        Arc::clone(&invoker).dead_letter(envelope);
                    }
                } else {
                    self.process_mailbox(&invoker);
                }
            }
            None => {
                debug!("{}: invoker dropped, discarding queued messages", self.label);
                self.close();
                while self.system_receiver.try_recv().is_ok() {}
            }
        }

        self.status
            .store(MailboxStatus::Idle as u8, Ordering::Release);
        // Leftover work gets a fresh turn behind other mailboxes.
        let _ = self.request_scheduling();
    }

    fn process_all_system_messages(&self, invoker: &Arc<dyn MessageInvoker>) {
        while let Ok(message) = self.system_receiver.try_recv() {
            trace!("{}: system message {:?}", self.label, message);
            let target = Arc::clone(invoker);
            let cause = match panic::catch_unwind(AssertUnwindSafe(|| {
                target.invoke_system_message(message)
            })) {
                Ok(Ok(())) => continue,
                Ok(Err(cause)) => cause,
                Err(payload) => ActorError::from_panic(payload),
            };
            error!("{}: system message processing failed: {}", self.label, cause);
            Arc::clone(invoker).handle_system_failure(cause);
        }
    }

    fn process_mailbox(&self, invoker: &Arc<dyn MessageInvoker>) {
        let mut left = self.dispatcher.throughput().max(1);
        // A deadline past the representable range means no deadline
        let deadline = self
            .dispatcher
            .throughput_deadline()
            .and_then(|limit| Instant::now().checked_add(limit));

        while left > 0 && self.should_process_user_messages() {
            let Some(envelope) = self.user_queue.dequeue() else {
                break;
            };

            let target = Arc::clone(invoker);
            match panic::catch_unwind(AssertUnwindSafe(|| target.invoke_user_message(envelope))) {
                Ok(Ok(())) => {}
                Ok(Err(cause)) => Arc::clone(invoker).handle_failure(cause),
                Err(payload) => Arc::clone(invoker).handle_failure(ActorError::from_panic(payload)),
            }

            self.process_all_system_messages(invoker);

            left -= 1;
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }
        }
    }

    fn should_process_user_messages(&self) -> bool {
        !self.is_closed() && !self.is_suspended()
    }

    fn has_runnable_work(&self) -> bool {
        !self.system_receiver.is_empty()
            || (self.user_queue.has_messages() && (self.is_closed() || !self.is_suspended()))
    }

    /// Stop processing user messages. Control messages are still processed.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    /// Continue processing user messages.
    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }

    /// Close the mailbox and take every queued user message.
    ///
    /// Later posts are refused with [`MailboxError::Closed`].
    pub fn close(&self) -> Vec<Envelope> {
        self.closed.store(true, Ordering::Release);
        self.user_queue.drain()
    }

    /// Whether user messages are on hold.
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Whether the mailbox refuses new messages.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current scheduling status.
    pub fn status(&self) -> MailboxStatus {
        MailboxStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Number of queued user messages.
    pub fn number_of_messages(&self) -> usize {
        self.user_queue.number_of_messages()
    }

    /// Whether control messages are waiting.
    pub fn has_system_messages(&self) -> bool {
        !self.system_receiver.is_empty()
    }

    /// The dispatcher this mailbox runs on.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Label used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("label", &self.label)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .field("suspended", &self.is_suspended())
            .field("messages", &self.number_of_messages())
            .field("dispatcher", &self.dispatcher.id())
            .finish()
    }
}
