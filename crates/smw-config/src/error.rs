use thiserror::Error;

/// Startup-time configuration failure. Always fatal.
///
/// Messages name config pointers and env var NAMES, never secret values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config path {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config json conversion failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED")]
    SecretLiteral { pointer: String },

    #[error(
        "CONFIG_UNUSED_KEYS: {count} unused config leaf key(s) detected. \
         Remove them or fix the spelling. First few: {preview}"
    )]
    UnusedKeys { count: usize, preview: String },

    #[error("invalid config value at {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("unparseable watermark expression {0:?}")]
    BadWatermark(String),

    #[error("failed to read pgpass file {path}: {source}")]
    Pgpass {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Unsupported(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
