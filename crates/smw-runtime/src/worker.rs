//! Single-flight worker loop.
//!
//! check cancellation -> await Tick -> run pass -> emit -> commit -> persist.
//!
//! Waiting for the next Tick is the only point where shutdown is observed; a
//! pass that has started always runs to completion.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use smw_db::DeltaQuery;
use smw_index::IndexLookup;
use smw_reconcile::TimeWatermark;

use crate::engine::ReconcileEngine;
use crate::notifier::{ChangeNotifier, NotifierError};
use crate::sink::ReportSink;
use crate::state::WatermarkStateFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Report emitted and the watermark committed (possibly unchanged).
    Committed(TimeWatermark),
    /// No report, or the report could not be emitted. Watermark untouched.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub ticks: u64,
    pub committed: u64,
    pub skipped: u64,
}

/// Everything after the Tick: run, emit, commit, persist.
///
/// Used directly for a single on-demand pass, and by [`Worker`] once per Tick.
pub struct Pipeline<D, I, S> {
    engine: ReconcileEngine<D, I>,
    sink: S,
    state: Option<WatermarkStateFile>,
}

impl<D, I, S> Pipeline<D, I, S>
where
    D: DeltaQuery,
    I: IndexLookup,
    S: ReportSink,
{
    pub fn new(engine: ReconcileEngine<D, I>, sink: S) -> Self {
        Self {
            engine,
            sink,
            state: None,
        }
    }

    /// Persist the watermark here after every committed pass.
    pub fn with_state_file(mut self, state: WatermarkStateFile) -> Self {
        self.state = Some(state);
        self
    }

    pub fn engine(&self) -> &ReconcileEngine<D, I> {
        &self.engine
    }

    /// One pass from the held watermark.
    pub async fn pass(&mut self) -> PassOutcome {
        let watermark = self.engine.watermark();

        let report = match self.engine.run(watermark).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, watermark = %watermark, "pass skipped");
                return PassOutcome::Skipped;
            }
        };

        if let Err(e) = self.sink.emit(&report) {
            warn!(error = %e, watermark = %watermark, "report emission failed; pass skipped");
            return PassOutcome::Skipped;
        }

        let committed = match self.engine.commit(&report) {
            Ok(wm) => wm,
            Err(e) => {
                error!(error = %e, "watermark regression rejected");
                return PassOutcome::Skipped;
            }
        };

        if let Some(state) = &self.state {
            if let Err(e) = state.save(committed).await {
                warn!(error = %e, path = ?state.path(), "failed to persist watermark");
            }
        }

        PassOutcome::Committed(committed)
    }
}

pub struct Worker<D, I, N, S> {
    pipeline: Pipeline<D, I, S>,
    notifier: N,
}

impl<D, I, N, S> Worker<D, I, N, S>
where
    D: DeltaQuery,
    I: IndexLookup,
    N: ChangeNotifier,
    S: ReportSink,
{
    pub fn new(engine: ReconcileEngine<D, I>, notifier: N, sink: S) -> Self {
        Self {
            pipeline: Pipeline::new(engine, sink),
            notifier,
        }
    }

    pub fn with_state_file(mut self, state: WatermarkStateFile) -> Self {
        self.pipeline = self.pipeline.with_state_file(state);
        self
    }

    pub fn engine(&self) -> &ReconcileEngine<D, I> {
        self.pipeline.engine()
    }

    /// Run until cancelled. A notifier failure ends the loop with an error.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<WorkerStats, NotifierError> {
        let mut stats = WorkerStats::default();
        info!(
            notifier = self.notifier.name(),
            watermark = %self.engine().watermark(),
            "worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let tick = match self.notifier.next_tick(cancel).await {
                Ok(Some(tick)) => tick,
                Ok(None) => break,
                Err(e) => {
                    error!(notifier = self.notifier.name(), error = %e, "notifier failed");
                    return Err(e);
                }
            };
            stats.ticks += 1;
            debug!(source = %tick.source, hint = ?tick.hint, "tick");

            match self.pipeline.pass().await {
                PassOutcome::Committed(_) => stats.committed += 1,
                PassOutcome::Skipped => stats.skipped += 1,
            }
        }

        info!(
            ticks = stats.ticks,
            committed = stats.committed,
            skipped = stats.skipped,
            watermark = %self.engine().watermark(),
            "worker stopped"
        );
        Ok(stats)
    }
}
