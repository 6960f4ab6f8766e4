//! Configuration utilities.
//!
//! The actor runtime reads its knobs (dispatcher types, throughput, mailbox
//! types, guardian restart budget) from a read-only key/value object. This
//! module defines that object: a tree of `ConfigValue`s addressed with dotted
//! paths such as `actor.default-dispatcher.throughput`.
//!
//! The tree is serde-compatible, so any serde format can produce one. Reading
//! configuration files is left to the embedding application.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Null value.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Integer value.
    Integer(i64),

    /// Floating-point value.
    Float(f64),

    /// String value.
    String(String),

    /// Array of values.
    Array(Vec<ConfigValue>),

    /// Map of values.
    Map(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Check if this value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer.
    ///
    /// Floats without a fractional part are accepted, since some serde
    /// formats do not distinguish the two.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    /// Get this value as a floating-point number.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get this value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a map.
    pub fn as_map(&self) -> Option<&HashMap<String, ConfigValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get a value from a map by key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Deep-merge another value into this one.
    ///
    /// Maps are merged key by key, recursively. Any other combination
    /// replaces this value with `other`.
    pub fn merge(&mut self, other: ConfigValue) {
        match (self, other) {
            (Self::Map(a), Self::Map(b)) => {
                for (key, value) in b {
                    match a.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            a.insert(key, value);
                        }
                    }
                }
            }
            (a, b) => {
                *a = b;
            }
        }
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Self::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\": {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A configuration tree addressed by dotted paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The root value.
    pub root: ConfigValue,
}

impl Config {
    /// Create an empty configuration (a map root).
    pub fn new() -> Self {
        Self {
            root: ConfigValue::Map(HashMap::new()),
        }
    }

    /// Create a configuration from a root value.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadre_core::utils::config::{Config, ConfigValue};
    ///
    /// let config = Config::from_value(ConfigValue::Integer(3));
    /// assert_eq!(config.get("").and_then(ConfigValue::as_integer), Some(3));
    /// ```
    pub fn from_value(root: impl Into<ConfigValue>) -> Self {
        Self { root: root.into() }
    }

    /// Get a value by path.
    ///
    /// The path is a string of keys separated by dots. An empty path returns
    /// the root.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        Self::keys(path).try_fold(&self.root, |current, key| current.get(key))
    }

    /// Get a value by path as a specific type.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadre_core::utils::config::Config;
    ///
    /// let mut config = Config::new();
    /// config.set("actor.default-dispatcher.throughput", 5).unwrap();
    ///
    /// let value = config.get_as::<i64>("actor.default-dispatcher.throughput");
    /// assert_eq!(value, Some(5));
    /// assert!(config.get_as::<String>("actor.default-dispatcher.throughput").is_none());
    /// ```
    pub fn get_as<T: FromConfigValue>(&self, path: &str) -> Option<T> {
        self.get(path).and_then(T::from_config_value)
    }

    /// Check if a path exists in the configuration.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value by path, creating intermediate maps as needed.
    ///
    /// Returns an error when the path is empty.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<(), ConfigError> {
        let keys: Vec<&str> = Self::keys(path).collect();
        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| ConfigError::invalid(path, "empty configuration path"))?;

        let mut current = &mut self.root;
        for key in parents {
            if !current.is_map() {
                *current = ConfigValue::Map(HashMap::new());
            }
            current = match current {
                ConfigValue::Map(map) => map
                    .entry((*key).to_string())
                    .or_insert_with(|| ConfigValue::Map(HashMap::new())),
                _ => return Err(ConfigError::invalid(path, "intermediate value is not a map")),
            };
        }

        if !current.is_map() {
            *current = ConfigValue::Map(HashMap::new());
        }
        match current {
            ConfigValue::Map(map) => {
                map.insert((*last).to_string(), value.into());
                Ok(())
            }
            _ => Err(ConfigError::invalid(path, "intermediate value is not a map")),
        }
    }

    /// Merge another configuration into this one, with `other` taking precedence.
    pub fn merge(&mut self, other: Config) {
        self.root.merge(other.root);
    }

    /// Read an optional string.
    pub fn get_string(&self, path: &str) -> Result<Option<String>, ConfigError> {
        match self.get(path) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| ConfigError::invalid(path, format!("expected a string, got {}", value))),
        }
    }

    /// Read an optional non-negative integer.
    pub fn get_usize(&self, path: &str) -> Result<Option<usize>, ConfigError> {
        match self.get(path) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(value) => value
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| {
                    ConfigError::invalid(path, format!("expected a non-negative integer, got {}", value))
                }),
        }
    }

    /// Read an optional duration.
    ///
    /// Integers are milliseconds. Strings carry a unit suffix: `us`, `ms`,
    /// `s` or `m` (for example `"250ms"` or `"10s"`).
    pub fn get_duration(&self, path: &str) -> Result<Option<Duration>, ConfigError> {
        match self.get(path) {
            None | Some(ConfigValue::Null) => Ok(None),
            Some(ConfigValue::Integer(ms)) => u64::try_from(*ms)
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| ConfigError::invalid(path, "durations cannot be negative")),
            Some(ConfigValue::String(s)) => parse_duration(s)
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(path, format!("cannot parse duration `{}`", s))),
            Some(value) => Err(ConfigError::invalid(
                path,
                format!("expected a duration, got {}", value),
            )),
        }
    }

    /// Keys of the map found at `path`, or an empty list.
    pub fn keys_at(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(ConfigValue::as_map)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn keys(path: &str) -> impl Iterator<Item = &str> {
        path.split('.').filter(|key| !key.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: u64 = digits.parse().ok()?;
    match unit.trim() {
        "us" => Some(Duration::from_micros(amount)),
        "" | "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

/// Trait for converting a ConfigValue to a specific type.
pub trait FromConfigValue: Sized {
    /// Convert a ConfigValue to this type, or `None` if the shapes differ.
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_integer()
    }
}

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_float()
    }
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        value.as_str().map(String::from)
    }
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        serde_json::from_str(
            r#"{
                "root": {
                    "actor": {
                        "default-dispatcher": {
                            "type": "Dispatcher",
                            "throughput": 5,
                            "throughput-deadline-time": "20ms"
                        },
                        "dispatchers": {
                            "ui": { "type": "SynchronizedDispatcher" },
                            "blocking": { "type": "PinnedDispatcher", "throughput": 1 }
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_get_by_path() {
        let config = sample();

        assert_eq!(
            config.get_as::<String>("actor.default-dispatcher.type"),
            Some("Dispatcher".to_string())
        );
        assert_eq!(
            config.get_usize("actor.dispatchers.blocking.throughput").unwrap(),
            Some(1)
        );
        assert!(config.contains("actor.dispatchers.ui"));
        assert!(!config.contains("actor.dispatchers.missing"));

        let mut keys = config.keys_at("actor.dispatchers");
        keys.sort();
        assert_eq!(keys, vec!["blocking".to_string(), "ui".to_string()]);
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut config = Config::new();
        config.set("actor.guardian.max-retries", 3).unwrap();
        config.set("actor.guardian.within-time-window", "10s").unwrap();

        assert_eq!(config.get_usize("actor.guardian.max-retries").unwrap(), Some(3));
        assert_eq!(
            config.get_duration("actor.guardian.within-time-window").unwrap(),
            Some(Duration::from_secs(10))
        );
        assert!(config.set("", 1).is_err());
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("15us"), Some(Duration::from_micros(15)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("3m"), Some(Duration::from_secs(180)));
        assert_eq!(parse_duration("40"), Some(Duration::from_millis(40)));
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10h"), None);

        let config = sample();
        assert_eq!(
            config
                .get_duration("actor.default-dispatcher.throughput-deadline-time")
                .unwrap(),
            Some(Duration::from_millis(20))
        );
        assert_eq!(config.get_duration("actor.missing").unwrap(), None);
        assert!(config.get_duration("actor.dispatchers.ui").is_err());
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        let config = sample();
        assert!(config.get_usize("actor.default-dispatcher.type").is_err());
        assert!(config.get_string("actor.default-dispatcher.throughput").is_err());
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = sample();
        let mut overrides = Config::new();
        overrides
            .set("actor.default-dispatcher.throughput", 50)
            .unwrap();

        base.merge(overrides);

        assert_eq!(
            base.get_usize("actor.default-dispatcher.throughput").unwrap(),
            Some(50)
        );
        assert_eq!(
            base.get_string("actor.default-dispatcher.type").unwrap(),
            Some("Dispatcher".to_string())
        );
    }
}
