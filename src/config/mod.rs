//! Configuration module for mdlsql.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, RewriteSettings, SessionSettings, Settings, SettingsError};
