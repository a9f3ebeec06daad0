//! Typed watcher configuration.
//!
//! Defaults match a stock deployment: store `metacat` on `localhost:5433`
//! read as `dataone_readonly`, index core `search_core` on `localhost:8983`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub watermark: WatermarkSection,
    pub store: StoreSection,
    pub index: IndexSection,
    pub notifier: NotifierSection,
    pub queue: QueueSection,
    pub report: ReportSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSection {
    /// Date/time expression for the starting watermark, e.g. `"midnight UTC"`,
    /// `"2 hours ago"`, `"2024-01-01T00:00:00Z"`.
    pub seed: String,
    /// When set, the committed watermark is persisted here and preferred over
    /// `seed` on restart.
    pub state_path: Option<PathBuf>,
}

impl Default for WatermarkSection {
    fn default() -> Self {
        Self {
            seed: "midnight UTC".to_string(),
            state_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// NAME of the env var holding the password. Never the password itself.
    pub password_env: Option<String>,
    /// pgpass-format file consulted when `password_env` yields nothing.
    pub pgpass: Option<PathBuf>,
    pub max_rows: i64,
    pub max_connections: u32,
    pub query_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// LISTEN channel for the database push notifier.
    pub channel: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5433,
            database: "metacat".to_string(),
            user: "dataone_readonly".to_string(),
            password_env: None,
            pgpass: None,
            max_rows: 5000,
            max_connections: 2,
            query_timeout_secs: 60,
            connect_timeout_secs: 10,
            channel: "sysm_watch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub url: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub id_field: String,
    pub modified_field: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:8983/solr/search_core/select".to_string(),
            batch_size: 10,
            timeout_secs: 30,
            id_field: "id".to_string(),
            modified_field: "dateModified".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Timer,
    Database,
    Queue,
}

impl NotifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierKind::Timer => "timer",
            NotifierKind::Database => "database",
            NotifierKind::Queue => "queue",
        }
    }
}

impl FromStr for NotifierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timer" => Ok(NotifierKind::Timer),
            "database" | "db" => Ok(NotifierKind::Database),
            "queue" => Ok(NotifierKind::Queue),
            other => Err(ConfigError::invalid(
                "/notifier/kind",
                format!("unknown notifier {other:?}; expected timer | database | queue"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSection {
    pub kind: NotifierKind,
    /// Timer poll interval.
    pub interval_secs: u64,
    /// Database push: emit a Tick after this long without a notification.
    pub idle_timeout_secs: u64,
}

impl Default for NotifierSection {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Timer,
            interval_secs: 30,
            idle_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "sysm_watch".to_string(),
            group_id: "sysmwatch".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Pretty-print each report to stdout.
    pub stdout: bool,
    /// Append each report as one JSON line to this file.
    pub jsonl_path: Option<PathBuf>,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            stdout: true,
            jsonl_path: None,
        }
    }
}

impl WatchConfig {
    pub fn from_json(config_json: &Value) -> Result<Self, ConfigError> {
        let cfg: WatchConfig = serde_json::from_value(config_json.clone())?;
        Ok(cfg)
    }

    /// Reject values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_rows <= 0 {
            return Err(ConfigError::invalid("/store/max_rows", "must be > 0"));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::invalid("/store/max_connections", "must be > 0"));
        }
        if self.store.query_timeout_secs == 0 {
            return Err(ConfigError::invalid("/store/query_timeout_secs", "must be > 0"));
        }
        if self.store.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid("/store/connect_timeout_secs", "must be > 0"));
        }
        if self.index.batch_size == 0 {
            return Err(ConfigError::invalid("/index/batch_size", "must be > 0"));
        }
        if self.index.timeout_secs == 0 {
            return Err(ConfigError::invalid("/index/timeout_secs", "must be > 0"));
        }
        if self.index.url.trim().is_empty() {
            return Err(ConfigError::invalid("/index/url", "must not be empty"));
        }
        if self.notifier.interval_secs == 0 {
            return Err(ConfigError::invalid("/notifier/interval_secs", "must be > 0"));
        }
        if self.notifier.idle_timeout_secs == 0 {
            return Err(ConfigError::invalid("/notifier/idle_timeout_secs", "must be > 0"));
        }
        match self.notifier.kind {
            NotifierKind::Database if self.store.channel.trim().is_empty() => {
                return Err(ConfigError::invalid("/store/channel", "must not be empty"));
            }
            NotifierKind::Queue if self.queue.topic.trim().is_empty() => {
                return Err(ConfigError::invalid("/queue/topic", "must not be empty"));
            }
            _ => {}
        }
        self.resolve_seed(Utc::now())?;
        Ok(())
    }

    /// Starting watermark from `watermark.seed`, evaluated relative to `now`.
    pub fn resolve_seed(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ConfigError> {
        smw_reconcile::parse_watermark_expr(&self.watermark.seed, now)
            .ok_or_else(|| ConfigError::BadWatermark(self.watermark.seed.clone()))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.store.query_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.store.connect_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.notifier.interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier.idle_timeout_secs)
    }
}
