//! Utility types shared by the cadre crates.

pub mod config;

pub use config::{Config, ConfigValue, FromConfigValue};
