//! The dispatcher: an execution resource plus per-run work bounds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cadre_core::{Config, ConfigError, DispatchError};
use log::debug;

/// A unit of work handed to an execution resource. For mailboxes this is
/// always "run this mailbox once".
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run [`Runnable`]s: a thread pool, a dedicated thread,
/// or a captured synchronization context.
pub trait ExecutorService: Send + Sync {
    /// Hand a runnable to the resource.
    fn execute(&self, runnable: Runnable) -> Result<(), DispatchError>;

    /// Stop accepting work.
    fn shutdown(&self);

    /// Whether the resource refuses work.
    fn is_shutdown(&self) -> bool;
}

/// Id of the dispatcher used when props do not name one.
pub const DEFAULT_DISPATCHER_ID: &str = "default-dispatcher";

/// Settings for one configured dispatcher id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Id referenced from props
    pub id: String,
    /// Dispatcher type tag
    pub kind: String,
    /// Maximum user messages per mailbox run
    pub throughput: usize,
    /// Wall-clock cap per mailbox run
    pub throughput_deadline: Option<Duration>,
    /// Worker threads for pool-backed dispatchers
    pub threads: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_DISPATCHER_ID.to_string(),
            kind: "Dispatcher".to_string(),
            throughput: 5,
            throughput_deadline: None,
            threads: num_cpus::get(),
        }
    }
}

impl DispatcherSettings {
    /// Read the settings stored under `path`, falling back to `fallback` for
    /// absent keys.
    pub fn from_config(
        id: &str,
        config: &Config,
        path: &str,
        fallback: &DispatcherSettings,
    ) -> Result<Self, ConfigError> {
        let key = |name: &str| format!("{}.{}", path, name);

        let kind = config
            .get_string(&key("type"))?
            .unwrap_or_else(|| fallback.kind.clone());
        let throughput = config
            .get_usize(&key("throughput"))?
            .unwrap_or(fallback.throughput);
        if throughput == 0 {
            return Err(ConfigError::invalid(key("throughput"), "throughput must be at least 1"));
        }
        let throughput_deadline = match config.get_duration(&key("throughput-deadline-time"))? {
            Some(deadline) => Some(deadline),
            None => fallback.throughput_deadline,
        };
        let threads = config
            .get_usize(&key("threads"))?
            .unwrap_or(fallback.threads);
        if threads == 0 {
            return Err(ConfigError::invalid(key("threads"), "threads must be at least 1"));
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            throughput,
            throughput_deadline,
            threads,
        })
    }
}

/// Maps mailboxes onto an execution resource and bounds each run.
pub struct Dispatcher {
    settings: DispatcherSettings,
    executor: Arc<dyn ExecutorService>,
    exclusive: bool,
}

impl Dispatcher {
    /// Create a dispatcher that may be shared by many mailboxes.
    pub fn new(settings: DispatcherSettings, executor: Arc<dyn ExecutorService>) -> Self {
        Self {
            settings,
            executor,
            exclusive: false,
        }
    }

    /// Create a dispatcher owned by a single actor. Its resource is shut down
    /// when that actor terminates.
    pub fn exclusive(settings: DispatcherSettings, executor: Arc<dyn ExecutorService>) -> Self {
        Self {
            settings,
            executor,
            exclusive: true,
        }
    }

    /// Hand a run to the execution resource.
    pub fn schedule(&self, runnable: Runnable) -> Result<(), DispatchError> {
        self.executor.execute(runnable)
    }

    /// The configured id.
    pub fn id(&self) -> &str {
        &self.settings.id
    }

    /// Maximum user messages per mailbox run.
    pub fn throughput(&self) -> usize {
        self.settings.throughput
    }

    /// Wall-clock cap per mailbox run.
    pub fn throughput_deadline(&self) -> Option<Duration> {
        self.settings.throughput_deadline
    }

    /// The settings this dispatcher was built from.
    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Whether this dispatcher belongs to one actor.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Called when an actor using this dispatcher terminates.
    pub(crate) fn detach(&self) {
        if self.exclusive {
            debug!("Releasing pinned dispatcher {}", self.settings.id);
            self.executor.shutdown();
        }
    }

    /// Stop the execution resource.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }

    /// Whether the execution resource refuses work.
    pub fn is_shutdown(&self) -> bool {
        self.executor.is_shutdown()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_fall_back() {
        let config: Config = serde_json::from_str(
            r#"{"root": {"actor": {"dispatchers": {"io": {"throughput": 20, "throughput-deadline-time": "15ms"}}}}}"#,
        )
        .unwrap();
        let fallback = DispatcherSettings {
            threads: 3,
            ..DispatcherSettings::default()
        };
        let settings =
            DispatcherSettings::from_config("io", &config, "actor.dispatchers.io", &fallback).unwrap();

        assert_eq!(settings.id, "io");
        assert_eq!(settings.kind, "Dispatcher");
        assert_eq!(settings.throughput, 20);
        assert_eq!(settings.throughput_deadline, Some(Duration::from_millis(15)));
        assert_eq!(settings.threads, 3);
    }

    #[test]
    fn test_settings_reject_zero_throughput() {
        let mut config = Config::new();
        config.set("actor.default-dispatcher.throughput", 0).unwrap();
        let result = DispatcherSettings::from_config(
            DEFAULT_DISPATCHER_ID,
            &config,
            "actor.default-dispatcher",
            &DispatcherSettings::default(),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "actor.default-dispatcher.throughput"));
    }
}
