//! smw-config
//!
//! Layered YAML configuration for the watcher.
//!
//! Documents are deep-merged in order (earlier = base, later = override),
//! converted to JSON, checked against the "no secret literals" policy, and
//! hashed over their canonical JSON form so a running process can log exactly
//! which effective configuration it was started with.
//!
//! The typed view of the merged document is [`WatchConfig`]; every key has a
//! default, so the watcher runs with no config file at all.

mod consumption;
mod error;
mod secrets;
mod watch;

use std::fs;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

pub use consumption::{report_unused_keys, UnusedKeyPolicy, UnusedKeyReport, CONSUMED_POINTERS};
pub use error::ConfigError;
pub use secrets::{pgpass_lookup, resolve_store_password, PasswordSource, StorePassword};
pub use watch::{
    IndexSection, NotifierKind, NotifierSection, QueueSection, ReportSection, StoreSection,
    WatchConfig, WatermarkSection,
};

/// Known secret-like prefixes. A leaf string starting with one of these
/// aborts loading with `CONFIG_SECRET_DETECTED`.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM private keys
    "AKIA",       // AWS access key ID
    "ghp_",       // GitHub PAT
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "sk-",
];

/// Config-leaf names that must never carry a literal value; only the NAME of
/// an environment variable belongs in YAML.
const SECRET_KEYS: &[&str] = &["password", "passwd", "secret", "token", "api_key"];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view over the merged document.
    pub fn watch_config(&self) -> Result<WatchConfig, ConfigError> {
        WatchConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig, ConfigError> {
    let mut docs: Vec<String> = Vec::with_capacity(paths.len());
    for p in paths {
        let p = p.as_ref();
        let raw = fs::read_to_string(p).map_err(|source| ConfigError::Read {
            path: p.display().to_string(),
            source,
        })?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig, ConfigError> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let v_json = serde_json::to_value(v_yaml)?;
        // An empty file parses as null and contributes nothing.
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    if !merged.is_object() {
        return Err(ConfigError::Invalid {
            key: "/".to_string(),
            reason: "top level must be a mapping".to_string(),
        });
    }

    enforce_no_secret_literals(&merged)?;

    // serde_json::Map is ordered by key, so this rendering is independent of
    // the key order in the source documents.
    let canonical_json = serde_json::to_string(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<(), ConfigError> {
    let mut leaves = Vec::new();
    consumption::collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        let Some(s) = v.pointer(&ptr).and_then(Value::as_str) else {
            continue;
        };
        let key = ptr.rsplit('/').next().unwrap_or_default();
        if SECRET_KEYS.contains(&key) && !s.trim().is_empty() {
            return Err(ConfigError::SecretLiteral { pointer: ptr });
        }
        if looks_like_secret(s) {
            return Err(ConfigError::SecretLiteral { pointer: ptr });
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
