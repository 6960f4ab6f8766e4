//! Envelopes and the control messages that travel in the system queue.

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use cadre_core::{ActorError, ActorId};

use crate::actor::ActorRef;

/// Type-erased message payload.
pub type AnyMessage = Box<dyn Any + Send>;

/// A message plus the handle of the actor that sent it.
///
/// Envelopes are immutable once built and are consumed exactly once by the
/// receiving actor's processing loop.
pub struct Envelope {
    message: AnyMessage,
    type_name: &'static str,
    sender: Option<ActorRef>,
}

impl Envelope {
    /// Wrap a message.
    pub fn new<M: Any + Send>(message: M, sender: Option<ActorRef>) -> Self {
        Self {
            message: Box::new(message),
            type_name: any::type_name::<M>(),
            sender,
        }
    }

    /// Wrap a control message for the system queue.
    pub fn system(message: SystemMessage) -> Self {
        Self::new(message, None)
    }

    /// Borrow the payload as `M` if that is its type.
    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        self.message.downcast_ref::<M>()
    }

    /// Whether the payload is an `M`.
    pub fn is<M: Any>(&self) -> bool {
        self.message.is::<M>()
    }

    /// The sender, if the message was sent from inside an actor.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// Name of the payload type, for logs and dead letters.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Split the envelope, taking ownership of the payload.
    pub fn into_parts(self) -> (AnyMessage, Option<ActorRef>) {
        (self.message, self.sender)
    }

    /// Unwrap a control message, or give the envelope back if it carries a
    /// user message.
    pub fn into_system(self) -> Result<SystemMessage, Self> {
        let Self {
            message,
            type_name,
            sender,
        } = self;
        match message.downcast::<SystemMessage>() {
            Ok(system) => Ok(*system),
            Err(message) => Err(Self {
                message,
                type_name,
                sender,
            }),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.type_name)
            .field("sender", &self.sender.as_ref().map(ActorRef::id))
            .finish()
    }
}

/// Lifecycle and supervision control messages.
///
/// These always land in the system queue and are processed ahead of any
/// pending user message.
#[derive(Debug, Clone)]
pub enum SystemMessage {
    /// Build the first instance and run `pre_start`
    Create,
    /// Replace the instance after a failure
    Recreate {
        /// The failure that triggered the restart
        cause: Arc<ActorError>,
        /// Stop children before the new instance is created
        stop_children: bool,
    },
    /// Stop processing user messages
    Suspend,
    /// Continue processing user messages
    Resume,
    /// Stop the actor and its children
    Terminate,
    /// A child failed and waits for a directive
    Failed {
        /// The failing child
        child: ActorId,
        /// What it failed with
        cause: Arc<ActorError>,
    },
    /// Start notifying `watcher` when this actor terminates
    Watch {
        /// The interested actor
        watcher: ActorId,
    },
    /// Stop notifying `watcher`
    Unwatch {
        /// The no longer interested actor
        watcher: ActorId,
    },
    /// A watched actor terminated
    DeathWatchNotification {
        /// The actor that terminated
        actor: ActorId,
    },
    /// A child finished terminating
    ChildTerminated {
        /// The terminated child
        child: ActorId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_downcast() {
        let envelope = Envelope::new(42u32, None);
        assert!(envelope.is::<u32>());
        assert_eq!(envelope.downcast_ref::<u32>(), Some(&42));
        assert!(envelope.downcast_ref::<String>().is_none());
        assert_eq!(envelope.type_name(), "u32");
    }

    #[test]
    fn test_into_system() {
        let envelope = Envelope::system(SystemMessage::Terminate);
        assert!(matches!(envelope.into_system(), Ok(SystemMessage::Terminate)));

        let envelope = Envelope::new("hello", None);
        let envelope = envelope.into_system().unwrap_err();
        assert_eq!(envelope.downcast_ref::<&str>(), Some(&"hello"));
    }
}
