//! Dispatcher type tags, configurators and the resolved dispatcher set.
//!
//! Configuration names a dispatcher type by tag. Tags are resolved against a
//! [`DispatcherRegistry`] once, when the actor system is built, producing a
//! [`DispatcherConfigurator`] per configured id. Actors then ask the
//! configurator for their dispatcher at spawn time.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use cadre_core::{ConfigError, DispatchError};
use log::info;
use parking_lot::Mutex;

use super::dispatcher::{Dispatcher, DispatcherSettings, DEFAULT_DISPATCHER_ID};
use super::sync_context::SyncContext;
use super::thread_pool::{ThreadPool, ThreadPoolConfig};

/// Hands out the dispatcher for one configured id.
pub trait DispatcherConfigurator: Send + Sync {
    /// The dispatcher for the next actor that asks.
    fn dispatcher(&self) -> Result<Arc<Dispatcher>, DispatchError>;

    /// Shut down every dispatcher this configurator handed out.
    fn shutdown(&self);
}

/// Builds a configurator from the settings of one dispatcher id.
pub type DispatcherFactory = Arc<
    dyn Fn(&DispatcherSettings) -> Result<Arc<dyn DispatcherConfigurator>, ConfigError>
        + Send
        + Sync,
>;

/// One pool shared by every actor configured with the id. The pool starts on
/// first use.
pub struct SharedPoolConfigurator {
    settings: DispatcherSettings,
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
}

impl SharedPoolConfigurator {
    /// Configurator for `settings`.
    pub fn new(settings: DispatcherSettings) -> Self {
        Self {
            settings,
            dispatcher: Mutex::new(None),
        }
    }
}

impl DispatcherConfigurator for SharedPoolConfigurator {
    fn dispatcher(&self) -> Result<Arc<Dispatcher>, DispatchError> {
        let mut slot = self.dispatcher.lock();
        if let Some(dispatcher) = slot.as_ref() {
            return Ok(Arc::clone(dispatcher));
        }

        let pool = ThreadPool::with_config(ThreadPoolConfig {
            queue_size: None,
            threads: self.settings.threads,
            thread_name_prefix: self.settings.id.clone(),
        })
        .map_err(|e| e.into_dispatch_error(&self.settings.id))?;
        info!(
            "Created dispatcher {} (throughput {}, {} threads)",
            self.settings.id, self.settings.throughput, self.settings.threads
        );

        let dispatcher = Arc::new(Dispatcher::new(self.settings.clone(), Arc::new(pool)));
        *slot = Some(Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.lock().as_ref() {
            dispatcher.shutdown();
        }
    }
}

/// A fresh single-thread dispatcher for every actor.
pub struct PinnedConfigurator {
    settings: DispatcherSettings,
    created: AtomicUsize,
    handed_out: Mutex<Vec<Weak<Dispatcher>>>,
}

impl PinnedConfigurator {
    /// Configurator for `settings`.
    pub fn new(settings: DispatcherSettings) -> Self {
        Self {
            settings,
            created: AtomicUsize::new(0),
            handed_out: Mutex::new(Vec::new()),
        }
    }
}

impl DispatcherConfigurator for PinnedConfigurator {
    fn dispatcher(&self) -> Result<Arc<Dispatcher>, DispatchError> {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        let pool = ThreadPool::with_config(ThreadPoolConfig {
            queue_size: None,
            threads: 1,
            thread_name_prefix: format!("{}-pinned-{}", self.settings.id, n),
        })
        .map_err(|e| e.into_dispatch_error(&self.settings.id))?;

        let dispatcher = Arc::new(Dispatcher::exclusive(self.settings.clone(), Arc::new(pool)));
        let mut handed_out = self.handed_out.lock();
        handed_out.retain(|weak| weak.strong_count() > 0);
        handed_out.push(Arc::downgrade(&dispatcher));
        Ok(dispatcher)
    }

    fn shutdown(&self) {
        for dispatcher in self.handed_out.lock().drain(..) {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.shutdown();
            }
        }
    }
}

/// Every actor configured with the id runs on the captured context.
pub struct SynchronizedConfigurator {
    dispatcher: Arc<Dispatcher>,
}

impl SynchronizedConfigurator {
    /// Configurator marshalling runs onto `context`.
    pub fn new(settings: DispatcherSettings, context: SyncContext) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(settings, Arc::new(context))),
        }
    }
}

impl DispatcherConfigurator for SynchronizedConfigurator {
    fn dispatcher(&self) -> Result<Arc<Dispatcher>, DispatchError> {
        Ok(Arc::clone(&self.dispatcher))
    }

    fn shutdown(&self) {
        self.dispatcher.shutdown();
    }
}

/// Maps dispatcher type tags to factories.
#[derive(Clone)]
pub struct DispatcherRegistry {
    factories: HashMap<String, DispatcherFactory>,
}

impl DispatcherRegistry {
    /// A registry with the built-in `Dispatcher`, `PinnedDispatcher` and
    /// `SynchronizedDispatcher` tags. `SynchronizedDispatcher` fails until a
    /// context is supplied with [`DispatcherRegistry::set_sync_context`].
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("Dispatcher", |settings| {
            Ok(Arc::new(SharedPoolConfigurator::new(settings.clone())))
        });
        registry.register("PinnedDispatcher", |settings| {
            Ok(Arc::new(PinnedConfigurator::new(settings.clone())))
        });
        registry.register("SynchronizedDispatcher", |settings| {
            Err(ConfigError::MissingSyncContext(settings.id.clone()))
        });
        registry
    }

    /// Register a factory under `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&DispatcherSettings) -> Result<Arc<dyn DispatcherConfigurator>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Bind `SynchronizedDispatcher` to a captured context.
    pub fn set_sync_context(&mut self, context: SyncContext) {
        self.register("SynchronizedDispatcher", move |settings| {
            Ok(Arc::new(SynchronizedConfigurator::new(
                settings.clone(),
                context.clone(),
            )))
        });
    }

    /// Resolve every configured dispatcher id against the registered tags.
    pub fn resolve(&self, settings: &[DispatcherSettings]) -> Result<Dispatchers, ConfigError> {
        let mut configurators = HashMap::with_capacity(settings.len());
        for dispatcher in settings {
            let factory = self
                .factories
                .get(&dispatcher.kind)
                .ok_or_else(|| ConfigError::UnknownDispatcherType(dispatcher.kind.clone()))?;
            configurators.insert(dispatcher.id.clone(), factory(dispatcher)?);
        }
        Ok(Dispatchers { configurators })
    }
}

impl Default for DispatcherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Dispatcher ids resolved to their configurators.
pub struct Dispatchers {
    configurators: HashMap<String, Arc<dyn DispatcherConfigurator>>,
}

impl Dispatchers {
    /// The dispatcher for `id`, or for the default dispatcher.
    pub fn lookup(&self, id: Option<&str>) -> cadre_core::Result<Arc<Dispatcher>> {
        let id = id.unwrap_or(DEFAULT_DISPATCHER_ID);
        let configurator = self
            .configurators
            .get(id)
            .ok_or_else(|| ConfigError::UnknownDispatcher(id.to_string()))?;
        Ok(configurator.dispatcher()?)
    }

    /// Whether `id` is configured.
    pub fn contains(&self, id: &str) -> bool {
        self.configurators.contains_key(id)
    }

    /// Shut down every dispatcher.
    pub fn shutdown(&self) {
        for configurator in self.configurators.values() {
            configurator.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_core::Error;

    fn settings(id: &str, kind: &str) -> DispatcherSettings {
        DispatcherSettings {
            id: id.to_string(),
            kind: kind.to_string(),
            threads: 1,
            ..DispatcherSettings::default()
        }
    }

    #[test]
    fn test_shared_dispatcher_is_reused() {
        let dispatchers = DispatcherRegistry::new()
            .resolve(&[settings(DEFAULT_DISPATCHER_ID, "Dispatcher")])
            .unwrap();
        let a = dispatchers.lookup(None).unwrap();
        let b = dispatchers.lookup(Some(DEFAULT_DISPATCHER_ID)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.is_exclusive());
        dispatchers.shutdown();
        assert!(a.is_shutdown());
    }

    #[test]
    fn test_pinned_dispatcher_is_fresh() {
        let dispatchers = DispatcherRegistry::new()
            .resolve(&[settings("pinned", "PinnedDispatcher")])
            .unwrap();
        let a = dispatchers.lookup(Some("pinned")).unwrap();
        let b = dispatchers.lookup(Some("pinned")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(a.is_exclusive());

        a.detach();
        assert!(a.is_shutdown());
        assert!(!b.is_shutdown());
        dispatchers.shutdown();
        assert!(b.is_shutdown());
    }

    #[test]
    fn test_synchronized_requires_context() {
        let registry = DispatcherRegistry::new();
        let result = registry.resolve(&[settings("ui", "SynchronizedDispatcher")]);
        assert!(matches!(result, Err(ConfigError::MissingSyncContext(ref id)) if id == "ui"));

        let mut registry = DispatcherRegistry::new();
        registry.set_sync_context(SyncContext::capture("ui"));
        let dispatchers = registry
            .resolve(&[settings("ui", "SynchronizedDispatcher")])
            .unwrap();
        assert!(dispatchers.lookup(Some("ui")).is_ok());
    }

    #[test]
    fn test_unknown_tag_and_id() {
        let result = DispatcherRegistry::new().resolve(&[settings("x", "ForkJoinExecutor")]);
        assert!(matches!(result, Err(ConfigError::UnknownDispatcherType(ref t)) if t == "ForkJoinExecutor"));

        let dispatchers = DispatcherRegistry::new().resolve(&[]).unwrap();
        assert!(matches!(
            dispatchers.lookup(Some("nope")),
            Err(Error::Config(ConfigError::UnknownDispatcher(_)))
        ));
    }

    #[test]
    fn test_custom_tag() {
        let mut registry = DispatcherRegistry::new();
        let context = SyncContext::capture("custom");
        registry.register("CallingThread", move |settings| {
            Ok(Arc::new(SynchronizedConfigurator::new(
                settings.clone(),
                context.clone(),
            )))
        });
        let dispatchers = registry.resolve(&[settings("calling", "CallingThread")]).unwrap();
        assert_eq!(dispatchers.lookup(Some("calling")).unwrap().id(), "calling");
    }
}
