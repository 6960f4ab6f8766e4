use std::sync::Arc;

use cadre_core::{ActorId, Result, SystemError};

use super::cell::ActorCell;
use super::{ActorRef, Props};
use crate::system::ActorSystem;

/// The actor's view of itself and its surroundings while it runs.
///
/// A context only exists during a `receive` or lifecycle hook call, on the
/// thread processing the actor.
pub struct ActorContext<'a> {
    cell: &'a Arc<ActorCell>,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(cell: &'a Arc<ActorCell>) -> Self {
        Self { cell }
    }

    /// Handle to this actor.
    pub fn self_ref(&self) -> ActorRef {
        ActorRef::new(Arc::clone(self.cell))
    }

    /// This actor's id.
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// The supervising actor, or `None` for top-level actors.
    pub fn parent(&self) -> Option<ActorRef> {
        let parent = self.cell.parent()?;
        self.cell.system()?.lookup_ref(parent)
    }

    /// Live children.
    pub fn children(&self) -> Vec<ActorRef> {
        let Some(system) = self.cell.system() else {
            return Vec::new();
        };
        self.cell
            .children()
            .into_iter()
            .filter_map(|child| system.lookup_ref(child))
            .collect()
    }

    /// Spawn a child supervised by this actor.
    pub fn spawn(&mut self, props: Props, name: &str) -> Result<ActorRef> {
        let system = self.cell.system().ok_or(SystemError::ShutDown)?;
        system.spawn(props, name, Some(self.cell))
    }

    /// Stop a child. Stopping any other actor works too; it is the same as
    /// [`ActorRef::stop`].
    pub fn stop(&mut self, actor: &ActorRef) {
        actor.stop();
    }

    /// Stop this actor after the current message.
    pub fn stop_self(&mut self) {
        self.self_ref().stop();
    }

    /// Receive a [`Terminated`](super::Terminated) message when `target`
    /// terminates. Watching an actor that already terminated delivers the
    /// message right away.
    pub fn watch(&mut self, target: &ActorRef) {
        if target.id() != self.id() {
            self.cell.watch(target.cell());
        }
    }

    /// Stop watching `target`. A `Terminated` for it that is not yet
    /// processed is dropped.
    pub fn unwatch(&mut self, target: &ActorRef) {
        self.cell.unwatch(target.cell());
    }

    /// The actor system, unless it has been dropped.
    pub fn system(&self) -> Option<ActorSystem> {
        self.cell.system().map(ActorSystem::from_inner)
    }
}
