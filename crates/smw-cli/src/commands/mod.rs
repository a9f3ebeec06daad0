//! Shared wiring: config, store pool, index client, sinks, starting watermark.

pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{info, warn};

use smw_config::{
    report_unused_keys, resolve_store_password, ConfigError, NotifierKind, UnusedKeyPolicy,
    WatchConfig,
};
use smw_db::StoreConnectParams;
use smw_index::{SolrIndex, SolrSettings};
use smw_reconcile::TimeWatermark;
use smw_runtime::{JsonlFileSink, MultiSink, StdoutSink, WatermarkStateFile};

/// CLI flags that override config keys.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub oldest: Option<String>,
    pub pgpass: Option<PathBuf>,
    pub port: Option<u16>,
    pub notifier: Option<NotifierKind>,
    pub interval_secs: Option<u64>,
    pub max_rows: Option<i64>,
}

impl Overrides {
    fn apply(&self, cfg: &mut WatchConfig) {
        if let Some(v) = &self.oldest {
            cfg.watermark.seed = v.clone();
        }
        if let Some(v) = &self.pgpass {
            cfg.store.pgpass = Some(v.clone());
        }
        if let Some(v) = self.port {
            cfg.store.port = v;
        }
        if let Some(v) = self.notifier {
            cfg.notifier.kind = v;
        }
        if let Some(v) = self.interval_secs {
            cfg.notifier.interval_secs = v;
        }
        if let Some(v) = self.max_rows {
            cfg.store.max_rows = v;
        }
    }
}

/// Load layered config, lint unknown keys, apply flag overrides, validate.
pub fn load_config(paths: &[PathBuf], overrides: &Overrides, strict: bool) -> Result<WatchConfig> {
    let loaded = smw_config::load_layered_yaml(paths)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, policy)?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "unknown config key ignored");
    }

    let mut cfg = loaded.watch_config()?;
    overrides.apply(&mut cfg);
    cfg.validate()?;

    if cfg.notifier.kind == NotifierKind::Queue && !cfg!(feature = "kafka") {
        return Err(ConfigError::Unsupported(
            "queue notifier requires a build with the `kafka` feature".to_string(),
        )
        .into());
    }

    info!(
        config_hash = %loaded.config_hash,
        layers = paths.len(),
        notifier = cfg.notifier.kind.as_str(),
        "config loaded"
    );
    Ok(cfg)
}

/// `SMW_DATABASE_URL` wins over the discrete `store.*` parameters.
pub async fn connect_store(cfg: &WatchConfig) -> Result<PgPool> {
    if let Ok(url) = std::env::var(smw_db::ENV_DB_URL) {
        let pool = smw_db::connect_url(&url, cfg.store.max_connections, cfg.connect_timeout())
            .await
            .with_context(|| format!("connect via {}", smw_db::ENV_DB_URL))?;
        return Ok(pool);
    }

    let password = resolve_store_password(&cfg.store)?;
    info!(source = ?password.source, "store password resolved");

    let params = StoreConnectParams {
        host: cfg.store.host.clone(),
        port: cfg.store.port,
        database: cfg.store.database.clone(),
        user: cfg.store.user.clone(),
        password: password.password,
        max_connections: cfg.store.max_connections,
        connect_timeout: cfg.connect_timeout(),
    };
    let pool = smw_db::connect(&params)
        .await
        .with_context(|| format!("connect {}:{}/{}", params.host, params.port, params.database))?;
    Ok(pool)
}

pub fn build_index(cfg: &WatchConfig) -> Result<SolrIndex> {
    let index = SolrIndex::new(SolrSettings {
        url: cfg.index.url.clone(),
        batch_size: cfg.index.batch_size,
        timeout: cfg.index_timeout(),
        id_field: cfg.index.id_field.clone(),
        modified_field: cfg.index.modified_field.clone(),
    })?;
    Ok(index)
}

pub fn build_sink(cfg: &WatchConfig) -> Result<MultiSink> {
    let mut sink = MultiSink::new();
    if cfg.report.stdout {
        sink.push(StdoutSink);
    }
    if let Some(path) = &cfg.report.jsonl_path {
        sink.push(JsonlFileSink::new(path)?);
    }
    if sink.is_empty() {
        warn!("no report sink configured; reports are discarded");
    }
    Ok(sink)
}

pub fn state_file(cfg: &WatchConfig) -> Option<WatermarkStateFile> {
    cfg.watermark
        .state_path
        .as_ref()
        .map(|p| WatermarkStateFile::new(p.clone()))
}

/// Persisted watermark if there is one, else the configured seed.
///
/// `seed_forced` (an explicit `--oldest`) skips the persisted watermark.
pub async fn initial_watermark(cfg: &WatchConfig, seed_forced: bool) -> Result<TimeWatermark> {
    if let Some(state) = state_file(cfg).filter(|_| !seed_forced) {
        if let Some(saved) = state.load().await? {
            info!(
                watermark = %saved.watermark,
                path = ?state.path(),
                "resuming from persisted watermark"
            );
            return Ok(saved.watermark);
        }
    }
    let seed = cfg.resolve_seed(Utc::now())?;
    let wm = TimeWatermark::new(seed);
    info!(watermark = %wm, seed = %cfg.watermark.seed, "starting from seed watermark");
    Ok(wm)
}
