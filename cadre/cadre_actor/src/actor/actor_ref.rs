use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cadre_core::ActorId;
use crossbeam_channel::Receiver;

use super::cell::ActorCell;
use super::{Kill, LifecycleState};
use crate::mailbox::{Envelope, SystemMessage};

/// A cloneable handle to a spawned actor.
///
/// Messages sent through a handle are never lost silently: anything the
/// actor's mailbox refuses goes to the system's dead letters.
#[derive(Clone)]
pub struct ActorRef {
    cell: Arc<ActorCell>,
}

impl ActorRef {
    pub(crate) fn new(cell: Arc<ActorCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell> {
        &self.cell
    }

    /// The actor's id.
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// The name given at spawn.
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    /// Send a message. Safe to call from any thread.
    pub fn tell<M: Any + Send>(&self, message: M, sender: Option<&ActorRef>) {
        self.send(Envelope::new(message, sender.cloned()));
    }

    /// Send a prepared envelope.
    pub fn send(&self, envelope: Envelope) {
        self.cell.post(envelope);
    }

    /// Stop the actor. Messages already queued are not processed.
    pub fn stop(&self) {
        self.cell.send_system(SystemMessage::Terminate);
    }

    /// Fail the actor with `ActorError::Killed` once earlier messages are
    /// processed.
    pub fn kill(&self) {
        self.tell(Kill, None);
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.cell.lifecycle()
    }

    /// Whether the actor has terminated.
    pub fn is_terminated(&self) -> bool {
        self.lifecycle() == LifecycleState::Terminated
    }

    /// A receiver that yields the actor's id once it terminates.
    pub fn termination(&self) -> Receiver<ActorId> {
        self.cell.termination()
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name(), self.id().short())
    }
}
