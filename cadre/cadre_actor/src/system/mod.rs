//! Actor system for managing actor lifecycles and interactions.
//!
//! The ActorSystem owns the resolved dispatchers and mailbox types, the
//! registry of live actors and the guardian strategy that supervises
//! top-level actors. Everything an actor needs from outside its own cell
//! (routing control messages by id, dead letters, root failures) goes
//! through here.

mod config;
mod dead_letters;

pub use config::ActorSystemConfig;
pub use dead_letters::{DeadLetter, DeadLetters};

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use cadre_core::{ActorError, ActorId, Config, ConfigError, Result, SystemError};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::actor::cell::ActorCell;
use crate::actor::{ActorRef, Props};
use crate::dispatch::{
    DispatcherConfigurator, DispatcherRegistry, DispatcherSettings, Dispatchers, SyncContext,
};
use crate::mailbox::{
    Envelope, Mailbox, MailboxRegistry, MailboxSettings, MailboxTypes, MessageInvoker,
    MessageQueue, SystemMessage,
};
use crate::supervision::{self, default_decider, Directive, Effect, RestartHistory, SupervisorStrategy};

pub(crate) struct SystemInner {
    name: String,
    registry: RwLock<HashMap<ActorId, Arc<ActorCell>>>,
    top_level: Mutex<Vec<ActorId>>,
    guardian_strategy: SupervisorStrategy,
    guardian_restarts: Mutex<HashMap<ActorId, RestartHistory>>,
    dispatchers: Dispatchers,
    mailboxes: MailboxTypes,
    dead_letters: DeadLetters,
    shut_down: AtomicBool,
    shutdown_timeout: Duration,
}

impl SystemInner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Create, register and start an actor. `parent` is `None` for
    /// top-level actors.
    pub(crate) fn spawn(
        self: &Arc<Self>,
        props: Props,
        name: &str,
        parent: Option<&Arc<ActorCell>>,
    ) -> Result<ActorRef> {
        if self.is_shut_down() {
            return Err(SystemError::ShutDown.into());
        }

        let dispatcher = self.dispatchers.lookup(props.dispatcher())?;
        let queue = match self.mailboxes.create_queue(props.mailbox()) {
            Ok(queue) => queue,
            Err(e) => {
                dispatcher.detach();
                return Err(e.into());
            }
        };

        let id = ActorId::new();
        let mailbox = Mailbox::new(format!("{}#{}", name, id.short()), queue, dispatcher);
        let cell = ActorCell::new(
            id,
            name.to_string(),
            parent.map(|p| p.id()),
            props,
            Arc::clone(&mailbox),
            Arc::downgrade(self),
        );
        let cell_ref: Arc<dyn MessageInvoker> = Arc::clone(&cell) as Arc<dyn MessageInvoker>;
        let invoker: Weak<dyn MessageInvoker> = Arc::downgrade(&cell_ref);
        mailbox.set_invoker(invoker);

        // Registered before the parent learns about it, so a Terminate sent
        // by the parent always finds the child.
        self.registry.write().insert(id, Arc::clone(&cell));

        let accepted = match parent {
            Some(parent) => parent.add_child(id),
            None => {
                let mut top_level = self.top_level.lock();
                let open = !self.is_shut_down();
                if open {
                    top_level.push(id);
                }
                open
            }
        };

        if !accepted {
            self.registry.write().remove(&id);
            mailbox.close();
            mailbox.dispatcher().detach();
            return Err(match parent {
                Some(parent) => SystemError::ParentTerminated(parent.id()).into(),
                None => SystemError::ShutDown.into(),
            });
        }

        debug!(
            "Spawned {} on {} (parent: {})",
            cell,
            mailbox.dispatcher().id(),
            parent.map_or_else(|| "guardian".to_string(), |p| p.to_string())
        );
        cell.send_system(SystemMessage::Create);
        Ok(ActorRef::new(cell))
    }

    pub(crate) fn lookup_ref(&self, id: ActorId) -> Option<ActorRef> {
        self.registry.read().get(&id).cloned().map(ActorRef::new)
    }

    /// Route a control message to a live actor.
    pub(crate) fn send_system(&self, target: ActorId, message: SystemMessage) {
        let cell = self.registry.read().get(&target).cloned();
        match cell {
            Some(cell) => cell.send_system(message),
            None => self.undeliverable(target, message),
        }
    }

    /// A control message whose target is gone.
    pub(crate) fn undeliverable(&self, target: ActorId, message: SystemMessage) {
        match message {
            // Watching a dead actor yields the notification right away
            SystemMessage::Watch { watcher } => {
                self.send_system(watcher, SystemMessage::DeathWatchNotification { actor: target })
            }
            message => debug!("Dropping {:?} for terminated actor {}", message, target),
        }
    }

    pub(crate) fn dead_letter(&self, recipient: ActorId, envelope: Envelope) {
        self.dead_letters.publish(recipient, envelope);
    }

    /// Supervise a failed top-level actor with the guardian strategy.
    pub(crate) fn handle_root_failure(&self, child: ActorId, cause: Arc<ActorError>) {
        let children = self.top_level.lock().clone();
        if !children.contains(&child) {
            debug!("Ignoring failure of unregistered actor {}", child);
            return;
        }

        let supervisor = format!("{}/guardian", self.name);
        let effect = {
            let mut histories = self.guardian_restarts.lock();
            supervision::supervise(
                &self.guardian_strategy,
                &supervisor,
                child,
                &children,
                &mut histories,
                &cause,
            )
        };

        let effect = match effect {
            Effect::Escalate => {
                warn!("{}: escalation reached the root, stopping {}", supervisor, child);
                self.guardian_strategy
                    .effect(Directive::Stop, child, &children, &cause)
            }
            effect => effect,
        };

        if let Effect::Send(messages) = effect {
            for (target, message) in messages {
                self.send_system(target, message);
            }
        }
    }

    pub(crate) fn unregister(&self, id: ActorId) {
        self.registry.write().remove(&id);
        self.top_level.lock().retain(|child| *child != id);
        self.guardian_restarts.lock().remove(&id);
    }
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        self.dispatchers.shutdown();
    }
}

/// The central actor system that manages actors.
///
/// Cloning is cheap; clones share the same system.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create an actor system with the default configuration.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::builder(name).build()
    }

    /// Create an actor system from a configuration object.
    pub fn with_config(name: impl Into<String>, config: &Config) -> Result<Self> {
        Self::builder(name).config(config.clone()).build()
    }

    /// Start building an actor system with custom registries.
    pub fn builder(name: impl Into<String>) -> ActorSystemBuilder {
        ActorSystemBuilder::new(name)
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    /// Spawn a top-level actor supervised by the guardian strategy.
    pub fn spawn(&self, props: Props, name: &str) -> Result<ActorRef> {
        self.inner.spawn(props, name, None)
    }

    /// Stop an actor and, first, all of its children.
    pub fn stop(&self, actor: &ActorRef) {
        actor.stop();
    }

    /// Find a live actor by id.
    pub fn lookup(&self, id: ActorId) -> Option<ActorRef> {
        self.inner.lookup_ref(id)
    }

    /// Number of live actors.
    pub fn actor_count(&self) -> usize {
        self.inner.registry.read().len()
    }

    /// The dead letter sink.
    pub fn dead_letters(&self) -> &DeadLetters {
        &self.inner.dead_letters
    }

    /// The system's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether [`ActorSystem::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    /// Stop every top-level actor, wait up to the configured shutdown timeout
    /// for them to terminate, then shut down the dispatchers.
    ///
    /// Returns `false` if some actor did not terminate in time. Actors on a
    /// synchronized dispatcher only make progress while their context is
    /// pumped, so shut those down with [`ActorRef::stop`] and the context
    /// instead of calling this from the context's thread.
    pub fn shutdown(&self) -> bool {
        if !self.inner.shut_down.swap(true, Ordering::AcqRel) {
            info!("Shutting down actor system {}", self.inner.name);
        }

        let roots: Vec<ActorId> = self.inner.top_level.lock().clone();
        let pending: Vec<_> = roots
            .into_iter()
            .filter_map(|id| self.inner.lookup_ref(id))
            .map(|actor| {
                let termination = actor.termination();
                actor.stop();
                (actor, termination)
            })
            .collect();

        let deadline = Instant::now().checked_add(self.inner.shutdown_timeout);
        let mut clean = true;
        for (actor, termination) in pending {
            let received = match deadline {
                Some(deadline) => termination.recv_deadline(deadline).is_ok(),
                None => termination.recv().is_ok(),
            };
            if !received {
                warn!("{} did not terminate within {:?}", actor, self.inner.shutdown_timeout);
                clean = false;
            }
        }

        self.inner.dispatchers.shutdown();
        info!(
            "Actor system {} shutdown complete ({} dead letters)",
            self.inner.name,
            self.inner.dead_letters.count()
        );
        clean
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.inner.name)
            .field("actors", &self.actor_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Builder for an [`ActorSystem`] with custom dispatcher types, mailbox
/// types, a synchronization context or a guardian strategy.
pub struct ActorSystemBuilder {
    name: String,
    config: Config,
    dispatcher_types: DispatcherRegistry,
    mailbox_types: MailboxRegistry,
    guardian_strategy: Option<SupervisorStrategy>,
}

impl ActorSystemBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::new(),
            dispatcher_types: DispatcherRegistry::new(),
            mailbox_types: MailboxRegistry::new(),
            guardian_strategy: None,
        }
    }

    /// Use `config` for dispatcher, mailbox and guardian settings.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Add a dispatcher type tag.
    pub fn register_dispatcher_type<F>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&DispatcherSettings) -> std::result::Result<Arc<dyn DispatcherConfigurator>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.dispatcher_types.register(tag, factory);
        self
    }

    /// Add a mailbox type tag.
    pub fn register_mailbox_type<F>(mut self, tag: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&MailboxSettings) -> Box<dyn MessageQueue> + Send + Sync + 'static,
    {
        self.mailbox_types.register(tag, factory);
        self
    }

    /// Bind the `SynchronizedDispatcher` type to a captured context.
    pub fn sync_context(mut self, context: SyncContext) -> Self {
        self.dispatcher_types.set_sync_context(context);
        self
    }

    /// Supervise top-level actors with `strategy` instead of the configured
    /// guardian budget.
    pub fn guardian_strategy(mut self, strategy: SupervisorStrategy) -> Self {
        self.guardian_strategy = Some(strategy);
        self
    }

    /// Resolve the configuration and build the system.
    pub fn build(self) -> Result<ActorSystem> {
        let settings = ActorSystemConfig::from_config(&self.config)?;
        let dispatchers = self.dispatcher_types.resolve(&settings.dispatchers)?;
        let mailboxes = self.mailbox_types.resolve(&settings.mailboxes)?;

        let guardian_strategy = self.guardian_strategy.unwrap_or_else(|| {
            let mut strategy = SupervisorStrategy::one_for_one(default_decider);
            if let Some(max_retries) = settings.guardian_max_retries {
                strategy = strategy.with_max_retries(max_retries);
            }
            if let Some(window) = settings.guardian_within {
                strategy = strategy.within(window);
            }
            strategy
        });

        info!(
            "Starting actor system {} with {} dispatchers and {} mailbox types",
            self.name,
            settings.dispatchers.len(),
            settings.mailboxes.len()
        );

        Ok(ActorSystem {
            inner: Arc::new(SystemInner {
                name: self.name,
                registry: RwLock::new(HashMap::new()),
                top_level: Mutex::new(Vec::new()),
                guardian_strategy,
                guardian_restarts: Mutex::new(HashMap::new()),
                dispatchers,
                mailboxes,
                dead_letters: DeadLetters::new(),
                shut_down: AtomicBool::new(false),
                shutdown_timeout: settings.shutdown_timeout,
            }),
        })
    }
}

impl fmt::Debug for ActorSystemBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystemBuilder")
            .field("name", &self.name)
            .field("dispatcher_types", &self.dispatcher_types)
            .field("mailbox_types", &self.mailbox_types)
            .field("guardian_strategy", &self.guardian_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorContext};
    use cadre_core::Error;
    use crossbeam_channel::{unbounded, Sender};

    struct Echo {
        seen: Sender<u32>,
    }

    impl Actor for Echo {
        fn receive(&mut self, _ctx: &mut ActorContext<'_>, envelope: &Envelope) -> std::result::Result<(), ActorError> {
            if let Some(n) = envelope.downcast_ref::<u32>() {
                let _ = self.seen.send(*n);
            }
            Ok(())
        }
    }

    fn echo_props(seen: Sender<u32>) -> Props {
        Props::from_fn(move || Echo { seen: seen.clone() })
    }

    #[test]
    fn test_spawn_and_lookup() {
        let system = ActorSystem::new("test").unwrap();
        let (tx, rx) = unbounded();

        let actor = system.spawn(echo_props(tx), "echo").unwrap();
        assert_eq!(system.actor_count(), 1);
        assert_eq!(system.lookup(actor.id()), Some(actor.clone()));

        actor.tell(7u32, None);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);

        assert!(system.shutdown());
        assert!(actor.is_terminated());
        assert_eq!(system.actor_count(), 0);
        assert!(system.lookup(actor.id()).is_none());
    }

    #[test]
    fn test_spawn_after_shutdown() {
        let system = ActorSystem::new("test").unwrap();
        assert!(system.shutdown());
        assert!(system.is_shut_down());

        let (tx, _rx) = unbounded();
        let result = system.spawn(echo_props(tx), "late");
        assert!(matches!(result, Err(Error::System(SystemError::ShutDown))));
    }

    #[test]
    fn test_unknown_dispatcher_and_mailbox() {
        let system = ActorSystem::new("test").unwrap();
        let (tx, _rx) = unbounded();

        let result = system.spawn(echo_props(tx.clone()).with_dispatcher("missing"), "a");
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownDispatcher(ref id))) if id == "missing"
        ));

        let result = system.spawn(echo_props(tx).with_mailbox("missing"), "b");
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownMailbox(ref id))) if id == "missing"
        ));
        assert_eq!(system.actor_count(), 0);
        system.shutdown();
    }

    #[test]
    fn test_unknown_types_fail_at_build() {
        let mut config = Config::new();
        config.set("actor.default-dispatcher.type", "Fibers").unwrap();
        assert!(matches!(
            ActorSystem::with_config("test", &config),
            Err(Error::Config(ConfigError::UnknownDispatcherType(_)))
        ));

        let mut config = Config::new();
        config.set("actor.mailboxes.odd.mailbox-type", "priority").unwrap();
        assert!(matches!(
            ActorSystem::with_config("test", &config),
            Err(Error::Config(ConfigError::UnknownMailboxType(_)))
        ));

        let mut config = Config::new();
        config
            .set("actor.dispatchers.ui.type", "SynchronizedDispatcher")
            .unwrap();
        assert!(matches!(
            ActorSystem::with_config("test", &config),
            Err(Error::Config(ConfigError::MissingSyncContext(_)))
        ));
    }

    #[test]
    fn test_custom_mailbox_type() {
        let mut config = Config::new();
        config
            .set("actor.mailboxes.latest.mailbox-type", "newest-first")
            .unwrap();
        let context = SyncContext::capture("test");
        config
            .set("actor.default-dispatcher.type", "SynchronizedDispatcher")
            .unwrap();

        let system = ActorSystem::builder("test")
            .config(config)
            .sync_context(context.clone())
            .register_mailbox_type("newest-first", |_| Box::new(crate::mailbox::StackQueue::new()))
            .build()
            .unwrap();

        let (tx, rx) = unbounded();
        let actor = system
            .spawn(echo_props(tx).with_mailbox("latest"), "latest")
            .unwrap();
        // Start the actor before queueing
        context.run_pending().unwrap();

        for n in 1..=3u32 {
            actor.tell(n, None);
        }
        context.run_pending().unwrap();
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn test_debug_output() {
        let system = ActorSystem::new("debugged").unwrap();
        let text = format!("{:?}", system);
        assert!(text.contains("debugged"));
        assert!(text.contains("actors: 0"));
    }
}
