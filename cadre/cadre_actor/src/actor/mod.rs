//! Actors, their handles and their lifecycle.
//!
//! An actor is an isolated unit of state that processes one message at a
//! time. Application code implements [`Actor`] and spawns it from [`Props`];
//! everything else talks to it through an [`ActorRef`].
//!
//! Lifecycle hooks run in a fixed order: `pre_start` once, then message
//! handling; on failure `pre_restart` on the old instance, a fresh instance
//! from the recipe and `post_restart` on it; on stop `post_stop`, exactly
//! once.

mod actor_ref;
pub(crate) mod cell;
mod context;
mod props;

pub use actor_ref::ActorRef;
pub use context::ActorContext;
pub use props::{Props, Recipe};

use std::fmt;

use cadre_core::{ActorError, ActorId};

use crate::mailbox::Envelope;

/// Application behavior.
pub trait Actor: Send + 'static {
    /// Handle one user message. An error fails the actor and is routed to
    /// its supervisor.
    fn receive(&mut self, ctx: &mut ActorContext<'_>, envelope: &Envelope) -> Result<(), ActorError>;

    /// Called once on the first instance, before any message.
    fn pre_start(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called on the failed instance before it is replaced. `message` is the
    /// envelope being processed when the failure happened, if any.
    fn pre_restart(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        _cause: &ActorError,
        _message: Option<&Envelope>,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called on the fresh instance after a restart.
    fn post_restart(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        _cause: &ActorError,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called once when the actor stops.
    fn post_stop(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorError> {
        Ok(())
    }
}

/// Fails the receiving actor with [`ActorError::Killed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kill;

/// Stops the receiving actor once the messages queued before it are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonPill;

/// Delivered to every watcher when a watched actor terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated {
    /// The actor that terminated
    pub actor: ActorId,
}

/// Where an actor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Spawned; `pre_start` has not completed
    Created,
    /// Processing messages
    Started,
    /// Between `pre_restart` and `post_restart`
    Restarting,
    /// `post_stop` has run; final
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Restarting => "restarting",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
