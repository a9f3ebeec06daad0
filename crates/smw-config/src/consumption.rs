//! Unused-key guard.
//!
//! Every leaf pointer in the merged document must be one the watcher
//! actually reads. Anything else is almost always a typo (`batchsize`,
//! `intervall_secs`) that would otherwise silently fall back to a default.
//!
//! "Consumed pointers" are JSON Pointer prefixes. A leaf under any consumed
//! prefix counts as consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

/// Pointers read by [`crate::WatchConfig`]. Keep in sync with `watch.rs`.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/watermark/seed",
    "/watermark/state_path",
    "/store/host",
    "/store/port",
    "/store/database",
    "/store/user",
    "/store/password_env",
    "/store/pgpass",
    "/store/max_rows",
    "/store/max_connections",
    "/store/query_timeout_secs",
    "/store/connect_timeout_secs",
    "/store/channel",
    "/index/url",
    "/index/batch_size",
    "/index/timeout_secs",
    "/index/id_field",
    "/index/modified_field",
    "/notifier/kind",
    "/notifier/interval_secs",
    "/notifier/idle_timeout_secs",
    "/queue/brokers",
    "/queue/topic",
    "/queue/group_id",
    "/report/jsonl_path",
    "/report/stdout",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Minimal set of unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Produce an unused-key report.
/// `Fail` returns an error when unused keys exist; `Warn` always returns the report.
pub fn report_unused_keys(
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport, ConfigError> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !CONSUMED_POINTERS.iter().any(|cp| is_prefix_pointer(cp, lp)))
        // `{}` renders as the lone root leaf; an empty document has no keys.
        .filter(|lp| lp != "/")
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        return Err(ConfigError::UnusedKeys {
            count: report.unused_leaf_pointers.len(),
            preview: preview_list(&report.unused_leaf_pointers, 12),
        });
    }

    Ok(report)
}

/// Return true if `prefix` is a JSON-pointer prefix of `leaf`.
///
/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

pub(crate) fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}
