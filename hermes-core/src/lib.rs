//! Hermes core library: configuration types, loading, validation, errors.
//!
//! - [`types`]: newtypes and configuration structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / validate / apply defaults / save

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{Config, Defaults, Logging, Project, ProjectName, RemoteTarget, Timezone, TransferMode};
