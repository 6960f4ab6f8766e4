//! Mailbox type tags and the factories behind them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cadre_core::{Config, ConfigError};

use super::queue::{BoundedQueue, MessageQueue, StackQueue, UnboundedQueue};

/// Id of the mailbox used when props do not name one.
pub const DEFAULT_MAILBOX_ID: &str = "default-mailbox";

/// Settings for one configured mailbox id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSettings {
    /// Id referenced from props
    pub id: String,
    /// Queue type tag
    pub kind: String,
    /// Capacity for bounded queues
    pub capacity: usize,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_MAILBOX_ID.to_string(),
            kind: "unbounded".to_string(),
            capacity: 1000,
        }
    }
}

impl MailboxSettings {
    /// Read the settings stored under `path`, falling back to `fallback` for
    /// absent keys.
    pub fn from_config(
        id: &str,
        config: &Config,
        path: &str,
        fallback: &MailboxSettings,
    ) -> Result<Self, ConfigError> {
        let kind = config
            .get_string(&format!("{}.mailbox-type", path))?
            .unwrap_or_else(|| fallback.kind.clone());
        let capacity = config
            .get_usize(&format!("{}.mailbox-capacity", path))?
            .unwrap_or(fallback.capacity);
        if capacity == 0 {
            return Err(ConfigError::invalid(
                format!("{}.mailbox-capacity", path),
                "capacity must be at least 1",
            ));
        }
        Ok(Self {
            id: id.to_string(),
            kind,
            capacity,
        })
    }
}

/// Builds a fresh user queue for one actor.
pub type QueueFactory = Arc<dyn Fn(&MailboxSettings) -> Box<dyn MessageQueue> + Send + Sync>;

/// Maps mailbox type tags to queue factories.
#[derive(Clone)]
pub struct MailboxRegistry {
    factories: HashMap<String, QueueFactory>,
}

impl MailboxRegistry {
    /// A registry with the built-in `unbounded`, `bounded` and `stack` tags.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("unbounded", |_| Box::new(UnboundedQueue::new()));
        registry.register("bounded", |settings| {
            Box::new(BoundedQueue::new(settings.capacity))
        });
        registry.register("stack", |_| Box::new(StackQueue::new()));
        registry
    }

    /// Register a queue factory under `tag`, replacing any previous one.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(&MailboxSettings) -> Box<dyn MessageQueue> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Resolve every configured mailbox id against the registered tags.
    pub fn resolve(&self, settings: &[MailboxSettings]) -> Result<MailboxTypes, ConfigError> {
        let mut resolved = HashMap::with_capacity(settings.len());
        for mailbox in settings {
            let factory = self
                .factories
                .get(&mailbox.kind)
                .ok_or_else(|| ConfigError::UnknownMailboxType(mailbox.kind.clone()))?;
            resolved.insert(mailbox.id.clone(), (mailbox.clone(), Arc::clone(factory)));
        }
        Ok(MailboxTypes { resolved })
    }
}

impl Default for MailboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MailboxRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Mailbox ids resolved to their factories at configuration load.
pub struct MailboxTypes {
    resolved: HashMap<String, (MailboxSettings, QueueFactory)>,
}

impl MailboxTypes {
    /// Create a user queue for the mailbox `id`, or for the default mailbox.
    pub fn create_queue(&self, id: Option<&str>) -> Result<Box<dyn MessageQueue>, ConfigError> {
        let id = id.unwrap_or(DEFAULT_MAILBOX_ID);
        let (settings, factory) = self
            .resolved
            .get(id)
            .ok_or_else(|| ConfigError::UnknownMailbox(id.to_string()))?;
        Ok(factory(settings))
    }

    /// Settings for the mailbox `id`.
    pub fn settings(&self, id: &str) -> Option<&MailboxSettings> {
        self.resolved.get(id).map(|(settings, _)| settings)
    }
}
