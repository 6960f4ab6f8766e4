//! # Cadre Core
//!
//! `cadre_core` provides the foundation shared by the cadre crates: the error
//! hierarchy, strongly-typed identifiers, and the read-only configuration
//! object the actor runtime takes its settings from.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all cadre components
//! - **id**: Strongly-typed identifier types
//! - **utils**: Configuration tree and helpers

pub mod error;
pub mod id;
pub mod utils;

// Re-export key types for convenience
pub use error::{ActorError, ConfigError, DispatchError, Error, Result, SystemError};
pub use id::ActorId;
pub use utils::config::{Config, ConfigValue};
