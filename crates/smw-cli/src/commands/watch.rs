//! watch / check / listen.

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use smw_config::{NotifierKind, WatchConfig};
use smw_db::PgDeltaQuery;
use smw_index::SolrIndex;
use smw_runtime::{
    spawn_signal_bridge, ChangeNotifier, DbPushNotifier, MultiSink, PassOutcome, Pipeline,
    ReconcileEngine, TimerNotifier, Worker,
};

use super::{build_index, build_sink, connect_store, initial_watermark, state_file};

type StoreEngine = ReconcileEngine<PgDeltaQuery, SolrIndex>;

/// Run the watcher until a signal arrives or the notifier fails.
pub async fn watch(cfg: &WatchConfig, seed_forced: bool) -> Result<()> {
    let pool = connect_store(cfg).await?;

    let cancel = CancellationToken::new();
    let bridge = spawn_signal_bridge(cancel.clone());

    let result = run_worker(cfg, seed_forced, &pool, &cancel).await;

    cancel.cancel();
    let _ = bridge.await;
    pool.close().await;
    info!("store pool closed");
    result
}

async fn run_worker(
    cfg: &WatchConfig,
    seed_forced: bool,
    pool: &PgPool,
    cancel: &CancellationToken,
) -> Result<()> {
    let notifier = build_notifier(cfg, Some(pool)).await?;
    let engine = build_engine(cfg, seed_forced, pool).await?;

    let mut worker = Worker::new(engine, notifier, build_sink(cfg)?);
    if let Some(state) = state_file(cfg) {
        worker = worker.with_state_file(state);
    }

    let stats = worker.run(cancel).await?;
    info!(
        ticks = stats.ticks,
        committed = stats.committed,
        skipped = stats.skipped,
        "watch finished"
    );
    Ok(())
}

/// Exactly one pass. A skipped pass is a failure exit.
pub async fn check(cfg: &WatchConfig, seed_forced: bool) -> Result<()> {
    let pool = connect_store(cfg).await?;
    let result = check_once(cfg, seed_forced, &pool).await;
    pool.close().await;
    result
}

async fn check_once(cfg: &WatchConfig, seed_forced: bool, pool: &PgPool) -> Result<()> {
    let engine = build_engine(cfg, seed_forced, pool).await?;
    let mut pipeline: Pipeline<_, _, MultiSink> = Pipeline::new(engine, build_sink(cfg)?);
    if let Some(state) = state_file(cfg) {
        pipeline = pipeline.with_state_file(state);
    }

    match pipeline.pass().await {
        PassOutcome::Committed(wm) => {
            info!(watermark = %wm, "check complete");
            Ok(())
        }
        PassOutcome::Skipped => bail!("pass did not complete; see log for the cause"),
    }
}

/// Print Ticks from the configured notifier. No store query, no index lookup.
pub async fn listen(cfg: &WatchConfig) -> Result<()> {
    let pool = match cfg.notifier.kind {
        NotifierKind::Database => Some(connect_store(cfg).await?),
        NotifierKind::Timer | NotifierKind::Queue => None,
    };

    let cancel = CancellationToken::new();
    let bridge = spawn_signal_bridge(cancel.clone());

    let result = print_ticks(cfg, pool.as_ref(), &cancel).await;

    cancel.cancel();
    let _ = bridge.await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    result
}

async fn print_ticks(
    cfg: &WatchConfig,
    pool: Option<&PgPool>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut notifier = build_notifier(cfg, pool).await?;
    while let Some(tick) = notifier.next_tick(cancel).await? {
        println!(
            "tick source={} hint={}",
            tick.source,
            tick.hint.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

async fn build_engine(
    cfg: &WatchConfig,
    seed_forced: bool,
    pool: &PgPool,
) -> Result<StoreEngine> {
    let delta = PgDeltaQuery::new(pool.clone(), cfg.query_timeout());
    let index = build_index(cfg)?;
    let watermark = initial_watermark(cfg, seed_forced).await?;
    Ok(ReconcileEngine::new(delta, index, watermark, cfg.store.max_rows))
}

async fn build_notifier(
    cfg: &WatchConfig,
    pool: Option<&PgPool>,
) -> Result<Box<dyn ChangeNotifier>> {
    match cfg.notifier.kind {
        NotifierKind::Timer => Ok(Box::new(TimerNotifier::new(cfg.interval()))),
        NotifierKind::Database => {
            let pool = pool.context("database notifier needs a store connection")?;
            let listener = smw_db::subscribe(pool, &cfg.store.channel).await?;
            info!(channel = %cfg.store.channel, "listening for store notifications");
            Ok(Box::new(DbPushNotifier::new(listener, cfg.idle_timeout())))
        }
        NotifierKind::Queue => queue_notifier(cfg),
    }
}

#[cfg(feature = "kafka")]
fn queue_notifier(cfg: &WatchConfig) -> Result<Box<dyn ChangeNotifier>> {
    use smw_runtime::{KafkaQueueSource, QueuePushNotifier};

    let source =
        KafkaQueueSource::connect(&cfg.queue.brokers, &cfg.queue.topic, &cfg.queue.group_id)?;
    Ok(Box::new(QueuePushNotifier::new(source)))
}

#[cfg(not(feature = "kafka"))]
fn queue_notifier(_cfg: &WatchConfig) -> Result<Box<dyn ChangeNotifier>> {
    Err(smw_config::ConfigError::Unsupported(
        "queue notifier requires a build with the `kafka` feature".to_string(),
    )
    .into())
}
