#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Cadre Actor
//!
//! The actor execution core of cadre.
//!
//! Actors are isolated units of state that talk only through asynchronous
//! messages. This crate provides what runs them:
//!
//! - Mailboxes with a prioritized control queue and a pluggable user queue
//! - Dispatchers mapping mailboxes onto thread pools, dedicated threads or a
//!   captured synchronization context
//! - Supervision strategies with bounded restart budgets
//! - The actor lifecycle state machine and death watch
//!
//! An actor is never processed by two threads at once, and a failing actor
//! is restarted or stopped by its supervisor through the same mailbox path,
//! so recovery never interleaves with message handling.
//!
//! ## Example
//!
//! ```no_run
//! use cadre_actor::{Actor, ActorContext, ActorSystem, Envelope, Props};
//! use cadre_core::ActorError;
//!
//! struct Greeter;
//!
//! impl Actor for Greeter {
//!     fn receive(&mut self, _ctx: &mut ActorContext<'_>, envelope: &Envelope) -> Result<(), ActorError> {
//!         if let Some(name) = envelope.downcast_ref::<String>() {
//!             println!("hello, {}", name);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let system = ActorSystem::new("example").unwrap();
//! let greeter = system.spawn(Props::from_fn(|| Greeter), "greeter").unwrap();
//! greeter.tell("world".to_string(), None);
//! system.shutdown();
//! ```

/// Actors, handles, props and lifecycle
pub mod actor;

/// Dispatchers and the execution resources behind them
pub mod dispatch;

/// Mailboxes, envelopes and message queues
pub mod mailbox;

/// Supervision strategies and restart budgets
pub mod supervision;

/// The actor system: registry, guardian and dead letters
pub mod system;

// Re-export key types for easier access
pub use actor::{
    Actor, ActorContext, ActorRef, Kill, LifecycleState, PoisonPill, Props, Recipe, Terminated,
};
pub use dispatch::{Dispatcher, DispatcherSettings, SyncContext, ThreadPool};
pub use mailbox::{Envelope, Mailbox, MessageQueue, SystemMessage};
pub use supervision::{Directive, StrategyKind, SupervisorStrategy};
pub use system::{ActorSystem, ActorSystemBuilder, ActorSystemConfig, DeadLetter, DeadLetters};
