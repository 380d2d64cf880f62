use thiserror::Error;

use crate::diagnostics::Diagnostics;

pub type Result<T> = std::result::Result<T, ObmlError>;

#[derive(Debug, Error)]
pub enum ObmlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("yaml safety error: {0}")]
    YamlSafety(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("model reference errors:\n{0}")]
    Resolution(Diagnostics),
    #[error("semantic validation errors:\n{0}")]
    Validation(Diagnostics),
    #[error("query resolution errors:\n{0}")]
    QueryResolution(Diagnostics),
    #[error("fanout error: {0}")]
    Fanout(String),
    #[error("planning error: {0}")]
    Planning(String),
    #[error("dialect error: {0}")]
    Dialect(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
