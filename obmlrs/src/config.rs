//! Compiler configuration: global defaults plus optional per-dialect
//! overrides.
//!
//! Grounded in the teacher's `SemaflowConfig` TOML-layering pattern
//! (`from_file`/`from_toml`/`load_default`, an env var override, a
//! `dirs::config_dir()` fallback) -- generalized here to the compiler's own
//! knobs (row limits, suggestion count, YAML safety caps). This crate never
//! dials a warehouse, so it carries none of the teacher's connection-pool or
//! per-backend (BigQuery/DuckDB/Postgres) settings.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ObmlError, Result};

fn default_max_row_limit() -> u64 {
    1_000_000
}

fn default_suggestion_count() -> usize {
    3
}

fn default_max_document_size() -> usize {
    5_000_000
}

fn default_max_node_count() -> usize {
    50_000
}

fn default_max_depth() -> usize {
    20
}

/// Caps the registry's YAML loader enforces before a document is handed to
/// `serde_yaml`. Mirrors `original_source`'s `_MAX_DOCUMENT_SIZE` /
/// `_MAX_NODE_COUNT` / `_MAX_DEPTH` constants, exposed as overridable config
/// rather than hardcoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YamlSafetyConfig {
    pub max_document_size: usize,
    pub max_node_count: usize,
    pub max_depth: usize,
}

impl Default for YamlSafetyConfig {
    fn default() -> Self {
        Self {
            max_document_size: default_max_document_size(),
            max_node_count: default_max_node_count(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerDefaults {
    /// Applied to a resolved query's `limit` when the query itself leaves it
    /// unset.
    pub max_row_limit: u64,
    /// How many "did you mean" candidates `diagnostics::suggest` returns.
    pub similarity_suggestion_count: usize,
    pub yaml: YamlSafetyConfig,
}

impl Default for CompilerDefaults {
    fn default() -> Self {
        Self {
            max_row_limit: default_max_row_limit(),
            similarity_suggestion_count: default_suggestion_count(),
            yaml: YamlSafetyConfig::default(),
        }
    }
}

/// A dialect-level default, applied when an OBML data object leaves its
/// `schema` blank. Placeholder for future per-dialect knobs, in the
/// teacher's per-backend override style (`BigQueryConfig`, `DuckDbConfig`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectOverride {
    pub default_schema: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObmlConfig {
    pub defaults: CompilerDefaults,
    #[serde(default)]
    pub dialects: HashMap<String, DialectOverride>,
}

impl ObmlConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ObmlError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Search order: `OBML_CONFIG` env var, `./obml.toml`, the user config
    /// dir (`~/.config/obml/config.toml`), then built-in defaults.
    #[tracing::instrument]
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("OBML_CONFIG") {
            tracing::info!(path = %path, "loading config from OBML_CONFIG");
            match Self::from_file(&path) {
                Ok(cfg) => return cfg,
                Err(error) => {
                    tracing::warn!(%error, path = %path, "failed to load OBML_CONFIG, falling back")
                }
            }
        }

        let cwd_path = Path::new("obml.toml");
        if cwd_path.exists() {
            tracing::debug!("loading config from ./obml.toml");
            if let Ok(cfg) = Self::from_file(cwd_path) {
                return cfg;
            }
        }

        if let Some(dir) = dirs::config_dir() {
            let user_path = dir.join("obml").join("config.toml");
            if user_path.exists() {
                tracing::debug!(path = ?user_path, "loading config from user config dir");
                if let Ok(cfg) = Self::from_file(&user_path) {
                    return cfg;
                }
            }
        }

        tracing::debug!("no config file found, using built-in defaults");
        Self::default()
    }

    pub fn dialect_override(&self, name: &str) -> Option<&DialectOverride> {
        self.dialects.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let cfg = ObmlConfig::default();
        assert_eq!(cfg.defaults.max_row_limit, 1_000_000);
        assert_eq!(cfg.defaults.yaml.max_depth, 20);
        assert_eq!(cfg.defaults.similarity_suggestion_count, 3);
    }

    #[test]
    fn parses_toml_overrides() {
        let toml_text = r#"
            [defaults]
            max_row_limit = 5000
            similarity_suggestion_count = 5

            [defaults.yaml]
            max_document_size = 1000
            max_node_count = 100
            max_depth = 5

            [dialects.snowflake]
            default_schema = "PUBLIC"
        "#;
        let cfg = ObmlConfig::from_toml(toml_text).unwrap();
        assert_eq!(cfg.defaults.max_row_limit, 5000);
        assert_eq!(cfg.defaults.yaml.max_depth, 5);
        assert_eq!(
            cfg.dialects.get("snowflake").unwrap().default_schema.as_deref(),
            Some("PUBLIC")
        );
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        std::env::remove_var("OBML_CONFIG");
        let cfg = ObmlConfig::load_default();
        assert_eq!(cfg.defaults.max_row_limit, 1_000_000);
    }
}
