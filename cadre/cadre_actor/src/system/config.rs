//! Typed actor system settings read from a [`Config`] object.

use std::time::Duration;

use cadre_core::{Config, ConfigError};

use crate::dispatch::{DispatcherSettings, DEFAULT_DISPATCHER_ID};
use crate::mailbox::{MailboxSettings, DEFAULT_MAILBOX_ID};

/// Configuration for the actor system
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSystemConfig {
    /// Every configured dispatcher; the first is the default one
    pub dispatchers: Vec<DispatcherSettings>,
    /// Every configured mailbox; the first is the default one
    pub mailboxes: Vec<MailboxSettings>,
    /// Restart budget for top-level actors
    pub guardian_max_retries: Option<usize>,
    /// Restart window for top-level actors
    pub guardian_within: Option<Duration>,
    /// How long `shutdown` waits for top-level actors to terminate
    pub shutdown_timeout: Duration,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            dispatchers: vec![DispatcherSettings::default()],
            mailboxes: vec![MailboxSettings::default()],
            guardian_max_retries: Some(10),
            guardian_within: Some(Duration::from_secs(60)),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ActorSystemConfig {
    /// Read settings from `config`. Absent keys keep their defaults.
    ///
    /// Recognized keys:
    /// - `actor.default-dispatcher.{type,throughput,throughput-deadline-time,threads}`
    /// - `actor.dispatchers.<id>.*`, defaulting to the default dispatcher's values
    /// - `actor.default-mailbox.{mailbox-type,mailbox-capacity}`
    /// - `actor.mailboxes.<id>.*`, defaulting to the default mailbox's values
    /// - `actor.guardian.{max-retries,within-time-window}`
    /// - `actor.shutdown-timeout`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_dispatcher = DispatcherSettings::from_config(
            DEFAULT_DISPATCHER_ID,
            config,
            "actor.default-dispatcher",
            &DispatcherSettings::default(),
        )?;
        let mut dispatchers = vec![default_dispatcher.clone()];
        for id in sorted_keys(config, "actor.dispatchers") {
            if id == DEFAULT_DISPATCHER_ID {
                return Err(ConfigError::invalid(
                    format!("actor.dispatchers.{}", id),
                    "use actor.default-dispatcher instead",
                ));
            }
            let path = format!("actor.dispatchers.{}", id);
            dispatchers.push(DispatcherSettings::from_config(
                &id,
                config,
                &path,
                &default_dispatcher,
            )?);
        }

        let default_mailbox = MailboxSettings::from_config(
            DEFAULT_MAILBOX_ID,
            config,
            "actor.default-mailbox",
            &MailboxSettings::default(),
        )?;
        let mut mailboxes = vec![default_mailbox.clone()];
        for id in sorted_keys(config, "actor.mailboxes") {
            if id == DEFAULT_MAILBOX_ID {
                return Err(ConfigError::invalid(
                    format!("actor.mailboxes.{}", id),
                    "use actor.default-mailbox instead",
                ));
            }
            let path = format!("actor.mailboxes.{}", id);
            mailboxes.push(MailboxSettings::from_config(
                &id,
                config,
                &path,
                &default_mailbox,
            )?);
        }

        Ok(Self {
            dispatchers,
            mailboxes,
            guardian_max_retries: config
                .get_usize("actor.guardian.max-retries")?
                .or(defaults.guardian_max_retries),
            guardian_within: config
                .get_duration("actor.guardian.within-time-window")?
                .or(defaults.guardian_within),
            shutdown_timeout: config
                .get_duration("actor.shutdown-timeout")?
                .unwrap_or(defaults.shutdown_timeout),
        })
    }

    /// Settings of the default dispatcher.
    pub fn default_dispatcher(&self) -> Option<&DispatcherSettings> {
        self.dispatchers.iter().find(|d| d.id == DEFAULT_DISPATCHER_ID)
    }
}

fn sorted_keys(config: &Config, path: &str) -> Vec<String> {
    let mut keys = config.keys_at(path);
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let config = ActorSystemConfig::from_config(&Config::new()).unwrap();
        assert_eq!(config, ActorSystemConfig::default());
        let dispatcher = config.default_dispatcher().unwrap();
        assert_eq!(dispatcher.kind, "Dispatcher");
        assert_eq!(dispatcher.throughput, 5);
    }

    #[test]
    fn test_full_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "root": {
                    "actor": {
                        "default-dispatcher": {"throughput": 10, "threads": 2},
                        "dispatchers": {
                            "blocking-io": {"type": "PinnedDispatcher"},
                            "ui": {"type": "SynchronizedDispatcher", "throughput": 1}
                        },
                        "default-mailbox": {"mailbox-type": "bounded", "mailbox-capacity": 50},
                        "mailboxes": {"latest-first": {"mailbox-type": "stack"}},
                        "guardian": {"max-retries": 3, "within-time-window": "10s"},
                        "shutdown-timeout": 250
                    }
                }
            }"#,
        )
        .unwrap();

        let settings = ActorSystemConfig::from_config(&config).unwrap();

        let ids: Vec<&str> = settings.dispatchers.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![DEFAULT_DISPATCHER_ID, "blocking-io", "ui"]);
        assert_eq!(settings.dispatchers[1].kind, "PinnedDispatcher");
        assert_eq!(settings.dispatchers[1].throughput, 10);
        assert_eq!(settings.dispatchers[1].threads, 2);
        assert_eq!(settings.dispatchers[2].throughput, 1);

        assert_eq!(settings.mailboxes[0].kind, "bounded");
        assert_eq!(settings.mailboxes[0].capacity, 50);
        assert_eq!(settings.mailboxes[1].id, "latest-first");
        assert_eq!(settings.mailboxes[1].kind, "stack");
        assert_eq!(settings.mailboxes[1].capacity, 50);

        assert_eq!(settings.guardian_max_retries, Some(3));
        assert_eq!(settings.guardian_within, Some(Duration::from_secs(10)));
        assert_eq!(settings.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::new();
        config.set("actor.default-dispatcher.throughput", "fast").unwrap();
        assert!(matches!(
            ActorSystemConfig::from_config(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = Config::new();
        config
            .set("actor.guardian.within-time-window", "forever")
            .unwrap();
        assert!(ActorSystemConfig::from_config(&config).is_err());
    }
}
