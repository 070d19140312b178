//! TOML-based configuration for mdlsql.
//!
//! Supports a config file (mdlsql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [session]
//! catalog = "accio"
//! schema = "${MDL_SCHEMA}"
//!
//! [rewrite]
//! dialect = "duckdb"
//! rules = ["metric_view", "syntactic_sugar", "accio"]
//! cte_prefix = "rs_"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::mdl::SessionContext;
use crate::rewrite::{RuleKind, SqlRewriter, DEFAULT_CTE_PREFIX};
use crate::sql::parse::SqlDialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unknown rewrite rule: {0}")]
    UnknownRule(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Default catalog and schema for unqualified table names.
    pub session: SessionSettings,

    /// Rewrite pipeline configuration.
    pub rewrite: RewriteSettings,
}

/// Session defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Catalog name (supports ${ENV_VAR} expansion).
    pub catalog: String,

    /// Schema name (supports ${ENV_VAR} expansion).
    pub schema: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            catalog: "accio".to_string(),
            schema: "public".to_string(),
        }
    }
}

/// Rewrite pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteSettings {
    /// SQL dialect used to parse and format statements.
    pub dialect: SqlDialect,

    /// Rule names, applied in order.
    pub rules: Vec<String>,

    /// Prefix of synthesized CTE names.
    pub cte_prefix: String,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            rules: RuleKind::defaults()
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            cte_prefix: DEFAULT_CTE_PREFIX.to_string(),
        }
    }
}

impl RewriteSettings {
    /// Parse the configured rule names.
    pub fn rule_kinds(&self) -> Result<Vec<RuleKind>, SettingsError> {
        self.rules
            .iter()
            .map(|name| {
                name.parse::<RuleKind>()
                    .map_err(|_| SettingsError::UnknownRule(name.clone()))
            })
            .collect()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `MDLSQL_CONFIG`
    /// 2. `./mdlsql.toml`
    /// 3. `~/.config/mdlsql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("MDLSQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("mdlsql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mdlsql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Session context with environment variables expanded.
    pub fn session(&self) -> Result<SessionContext, SettingsError> {
        Ok(SessionContext::new(
            expand_env_vars(&self.session.catalog)?,
            expand_env_vars(&self.session.schema)?,
        ))
    }

    /// Rewrite pipeline described by the `[rewrite]` section.
    pub fn planner(&self) -> Result<SqlRewriter, SettingsError> {
        let rules = self.rewrite.rule_kinds()?;
        let prefix = expand_env_vars(&self.rewrite.cte_prefix)?;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SettingsError::InvalidConfig(format!(
                "cte_prefix must be a non-empty identifier prefix: {:?}",
                prefix
            )));
        }
        Ok(SqlRewriter::with_rules(self.rewrite.dialect, &rules, &prefix))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
