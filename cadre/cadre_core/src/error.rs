//! Error types for the cadre actor runtime.
//!
//! Errors are organized by subsystem. The root error type, `Error`, can wrap
//! any of the subsystem-specific errors so callers at the top level handle a
//! single type.
//!
//! `ActorError` is different from the others: it is the failure an actor
//! raises while processing a message. It never reaches the sender of that
//! message. It is routed to the actor's supervisor instead.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::id::ActorId;

/// Root error type for cadre.
#[derive(Debug, Error)]
pub enum Error {
    /// Failures raised by actor code
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// Execution resource errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Invalid or unresolvable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Actor system bookkeeping errors
    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// General runtime errors
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// A failure raised while an actor processes a message or runs a lifecycle hook.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor received a `Kill` message
    #[error("actor was killed")]
    Killed,

    /// `pre_start` or `post_restart` failed, so the instance never became usable
    #[error("actor initialization failed: {0}")]
    Initialization(String),

    /// The handler panicked and the panic was caught by the mailbox run loop
    #[error("actor panicked: {0}")]
    Panicked(String),

    /// Any error returned by application code
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActorError {
    /// Build a failure from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Other(anyhow::Error::msg(message))
    }

    /// Wrap a typed application error so deciders can downcast it later.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(anyhow::Error::new(error))
    }

    /// Downcast an application error wrapped in `Other`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Other(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Convert a caught panic payload into a failure.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(message) => (*message).to_string(),
                None => "<unknown panic>".to_string(),
            },
        };
        Self::Panicked(message)
    }
}

/// Errors raised by execution resources behind a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts work
    #[error("dispatcher {0} is shutting down")]
    ShuttingDown(String),

    /// The execution resource refused a run
    #[error("dispatcher {dispatcher} rejected a run: {reason}")]
    Rejected {
        /// Dispatcher id
        dispatcher: String,
        /// Why the run was refused
        reason: String,
    },

    /// Worker threads could not be started
    #[error("failed to start dispatcher threads: {0}")]
    ResourceExhausted(String),

    /// A synchronization context was pumped from a thread other than the captured one
    #[error("synchronization context can only be pumped from its captured thread")]
    WrongThread,
}

/// Errors raised while turning configuration into runtime settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A dispatcher `type` tag has no registered factory
    #[error("unknown dispatcher type `{0}`")]
    UnknownDispatcherType(String),

    /// A `mailbox-type` tag has no registered factory
    #[error("unknown mailbox type `{0}`")]
    UnknownMailboxType(String),

    /// Props referenced a dispatcher id that was never configured
    #[error("unknown dispatcher `{0}`")]
    UnknownDispatcher(String),

    /// Props referenced a mailbox id that was never configured
    #[error("unknown mailbox `{0}`")]
    UnknownMailbox(String),

    /// A key holds a value of the wrong shape
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        /// Configuration path
        key: String,
        /// What was wrong with it
        reason: String,
    },

    /// A synchronized dispatcher was configured without a captured context
    #[error("synchronized dispatcher `{0}` requires a captured synchronization context")]
    MissingSyncContext(String),
}

impl ConfigError {
    /// Shorthand for `InvalidValue`.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the actor system itself.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The system has been shut down
    #[error("actor system is shut down")]
    ShutDown,

    /// No live actor has the given id
    #[error("actor not found: {0}")]
    ActorNotFound(ActorId),

    /// Children cannot be created under an actor that is stopping or stopped
    #[error("cannot spawn a child under terminated actor {0}")]
    ParentTerminated(ActorId),
}

/// Result type used across cadre.
pub type Result<T> = std::result::Result<T, Error>;
