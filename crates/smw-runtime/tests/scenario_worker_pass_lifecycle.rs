//! Scenario: Worker pass lifecycle
//!
//! # Invariants under test
//!
//! 1. A pass that fails at the store or the index produces no report and
//!    leaves the watermark unchanged; the next Tick retries from the same
//!    watermark.
//! 2. A report that cannot be emitted is not committed.
//! 3. A discrepancy holds the watermark at its timestamp until the index
//!    catches up; the watermark then advances to the newest fetched record.
//! 4. Cancellation before the first Tick runs no pass at all; cancellation
//!    during a pass lets that pass finish (emit, commit, persist) and the
//!    loop stops before the next Tick.
//! 5. A notifier failure ends the loop with an error.
//! 6. Every committed watermark is persisted to the state file.
//! 7. A single on-demand pass (no notifier) follows the same commit rules.
//!
//! All tests are pure in-process; no DB or network required.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use smw_db::{DeltaQuery, StoreError};
use smw_index::{IndexError, IndexLookup};
use smw_reconcile::{IndexEntry, Report, StoreRecord, TimeWatermark};
use smw_runtime::{
    ChangeNotifier, NotifierError, PassOutcome, Pipeline, ReconcileEngine, ReportSink, Tick,
    TickSource, WatermarkStateFile, Worker,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

fn t(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
}

fn rec(id: &str, h: u32) -> StoreRecord {
    StoreRecord::new(id, t(h), t(0), "urn:node:TEST", "eml://ecoinformatics.org/eml-2.1.1")
}

#[derive(Clone, Default)]
struct FakeStore {
    records: Arc<Mutex<Vec<StoreRecord>>>,
    failures_left: Arc<Mutex<usize>>,
    seen_since: Arc<Mutex<Vec<DateTime<Utc>>>>,
    cancel_during_fetch: Arc<Mutex<Option<CancellationToken>>>,
}

impl FakeStore {
    fn with(records: Vec<StoreRecord>) -> Self {
        let s = Self::default();
        *s.records.lock().unwrap() = records;
        s
    }

    fn fail_next(&self, n: usize) {
        *self.failures_left.lock().unwrap() = n;
    }

    /// Cancel `token` from inside the next delta query.
    fn cancel_during_next_fetch(&self, token: CancellationToken) {
        *self.cancel_during_fetch.lock().unwrap() = Some(token);
    }

    fn seen(&self) -> Vec<DateTime<Utc>> {
        self.seen_since.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DeltaQuery for FakeStore {
    async fn fetch_delta(
        &self,
        since: DateTime<Utc>,
        max_rows: i64,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        self.seen_since.lock().unwrap().push(since);
        if let Some(token) = self.cancel_during_fetch.lock().unwrap().take() {
            token.cancel();
        }
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Timeout(Duration::from_secs(1)));
            }
        }
        let mut out: Vec<StoreRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.modified_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        out.truncate(max_rows as usize);
        Ok(out)
    }
}

#[derive(Clone, Default)]
struct FakeIndex {
    docs: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakeIndex {
    fn put(&self, id: &str, h: u32) {
        self.docs.lock().unwrap().insert(id.to_string(), t(h));
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait::async_trait]
impl IndexLookup for FakeIndex {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn lookup(&self, ids: &[String]) -> Result<Vec<IndexEntry>, IndexError> {
        if *self.failing.lock().unwrap() {
            return Err(IndexError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let docs = self.docs.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id).map(|at| IndexEntry::new(id.clone(), *at)))
            .collect())
    }
}

/// Ticks once per scripted step, running `before` hooks between ticks, then
/// reports shutdown.
struct ScriptedNotifier {
    steps: VecDeque<Box<dyn FnOnce() + Send>>,
    fail_when_exhausted: bool,
}

impl ScriptedNotifier {
    fn ticks(n: usize) -> Self {
        let steps = (0..n).map(|_| Box::new(|| {}) as Box<dyn FnOnce() + Send>).collect();
        Self {
            steps,
            fail_when_exhausted: false,
        }
    }

    fn then(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.steps.push_back(Box::new(hook));
        self
    }
}

#[async_trait::async_trait]
impl ChangeNotifier for ScriptedNotifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn next_tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Tick>, NotifierError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        match self.steps.pop_front() {
            Some(hook) => {
                hook();
                Ok(Some(Tick::new(TickSource::Timer)))
            }
            None if self.fail_when_exhausted => {
                Err(NotifierError::Queue("broker went away".to_string()))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    reports: Arc<Mutex<Vec<Report>>>,
    failures_left: Arc<Mutex<usize>>,
}

impl ReportSink for RecordingSink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            anyhow::bail!("sink unavailable");
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

fn worker(
    store: &FakeStore,
    index: &FakeIndex,
    notifier: ScriptedNotifier,
    sink: &RecordingSink,
    start: DateTime<Utc>,
) -> Worker<FakeStore, FakeIndex, ScriptedNotifier, RecordingSink> {
    let engine = ReconcileEngine::new(store.clone(), index.clone(), TimeWatermark::new(start), 5000);
    Worker::new(engine, notifier, sink.clone())
}

// ---------------------------------------------------------------------------
// 1. Store / index failure skips the pass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_keeps_watermark_and_next_tick_retries() {
    let store = FakeStore::with(vec![rec("a", 2), rec("b", 4)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    index.put("b", 4);
    store.fail_next(1);
    let sink = RecordingSink::default();

    let mut w = worker(&store, &index, ScriptedNotifier::ticks(2), &sink, t(0));
    let stats = w.run(&CancellationToken::new()).await.unwrap();

    assert_eq!((stats.ticks, stats.skipped, stats.committed), (2, 1, 1));
    assert_eq!(store.seen(), vec![t(0), t(0)], "retry starts from the same watermark");
    assert_eq!(w.engine().watermark(), TimeWatermark::new(t(4)));

    let reports = sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 1, "failed pass emits nothing");
    assert_eq!(reports[0].watermark_used, TimeWatermark::new(t(0)));
}

#[tokio::test]
async fn index_failure_keeps_watermark() {
    let store = FakeStore::with(vec![rec("a", 2)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    index.set_failing(true);
    let sink = RecordingSink::default();

    let recover = index.clone();
    let notifier = ScriptedNotifier::ticks(1).then(move || recover.set_failing(false));
    let mut w = worker(&store, &index, notifier, &sink, t(1));
    let stats = w.run(&CancellationToken::new()).await.unwrap();

    assert_eq!((stats.skipped, stats.committed), (1, 1));
    assert_eq!(store.seen(), vec![t(1), t(1)]);
    assert_eq!(w.engine().watermark(), TimeWatermark::new(t(2)));
}

// ---------------------------------------------------------------------------
// 2. Emission failure is not committed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unemitted_report_is_not_committed() {
    let store = FakeStore::with(vec![rec("a", 2)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    let sink = RecordingSink::default();
    *sink.failures_left.lock().unwrap() = 1;

    let mut w = worker(&store, &index, ScriptedNotifier::ticks(3), &sink, t(0));
    let stats = w.run(&CancellationToken::new()).await.unwrap();

    assert_eq!((stats.skipped, stats.committed), (1, 2));
    assert_eq!(store.seen(), vec![t(0), t(0), t(2)]);
}

// ---------------------------------------------------------------------------
// 3. Discrepancy holds the watermark until resolved
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discrepancy_pins_watermark_until_index_catches_up() {
    let store = FakeStore::with(vec![rec("a", 1), rec("b", 3), rec("c", 5)]);
    let index = FakeIndex::default();
    index.put("a", 1);
    index.put("c", 5);
    let sink = RecordingSink::default();

    let late = index.clone();
    let notifier = ScriptedNotifier::ticks(2).then(move || late.put("b", 3));
    let mut w = worker(&store, &index, notifier, &sink, t(0));
    w.run(&CancellationToken::new()).await.unwrap();

    let reports = sink.reports.lock().unwrap();
    let next: Vec<TimeWatermark> = reports.iter().map(|r| r.next_watermark).collect();
    assert_eq!(
        next,
        vec![
            TimeWatermark::new(t(3)),
            TimeWatermark::new(t(3)),
            TimeWatermark::new(t(5)),
        ]
    );
    assert_eq!(reports[0].missing_count(), 1);
    assert_eq!(reports[1].records.len(), 2, "b and c re-examined");
    assert!(reports[2].is_clean());
}

// ---------------------------------------------------------------------------
// 4 + 5. Loop termination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_first_tick_runs_nothing() {
    let store = FakeStore::with(vec![rec("a", 2)]);
    let index = FakeIndex::default();
    let sink = RecordingSink::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut w = worker(&store, &index, ScriptedNotifier::ticks(5), &sink, t(0));
    let stats = w.run(&cancel).await.unwrap();

    assert_eq!(stats.ticks, 0);
    assert!(store.seen().is_empty());
    assert!(sink.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_mid_pass_finishes_that_pass_then_stops() {
    let dir = tempfile::tempdir().unwrap();
    let state = WatermarkStateFile::new(dir.path().join("watermark.json"));

    let store = FakeStore::with(vec![rec("a", 2), rec("b", 4)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    index.put("b", 4);
    let sink = RecordingSink::default();
    let cancel = CancellationToken::new();
    store.cancel_during_next_fetch(cancel.clone());

    let mut w = worker(&store, &index, ScriptedNotifier::ticks(3), &sink, t(0))
        .with_state_file(state.clone());
    let stats = w.run(&cancel).await.unwrap();

    assert!(cancel.is_cancelled());
    assert_eq!((stats.ticks, stats.committed, stats.skipped), (1, 1, 0));
    assert_eq!(store.seen().len(), 1, "no second pass after cancellation");
    assert_eq!(sink.reports.lock().unwrap().len(), 1, "in-flight report still emitted");
    assert_eq!(w.engine().watermark(), TimeWatermark::new(t(4)));
    assert_eq!(
        state.load().await.unwrap().unwrap().watermark,
        TimeWatermark::new(t(4))
    );
}

#[tokio::test]
async fn notifier_failure_is_fatal() {
    let store = FakeStore::with(vec![]);
    let index = FakeIndex::default();
    let sink = RecordingSink::default();
    let mut notifier = ScriptedNotifier::ticks(1);
    notifier.fail_when_exhausted = true;

    let mut w = worker(&store, &index, notifier, &sink, t(0));
    let err = w.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, NotifierError::Queue(_)));
    assert_eq!(store.seen().len(), 1, "the pass before the failure still ran");
}

// ---------------------------------------------------------------------------
// 6. Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn committed_watermark_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let state = WatermarkStateFile::new(dir.path().join("watermark.json"));

    let store = FakeStore::with(vec![rec("a", 2), rec("b", 7)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    index.put("b", 7);
    let sink = RecordingSink::default();

    let mut w = worker(&store, &index, ScriptedNotifier::ticks(1), &sink, t(0))
        .with_state_file(state.clone());
    w.run(&CancellationToken::new()).await.unwrap();

    let saved = state.load().await.unwrap().expect("state written");
    assert_eq!(saved.watermark, TimeWatermark::new(t(7)));
}

// ---------------------------------------------------------------------------
// 7. Single pass without a notifier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_pass_commits_or_skips_like_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let state = WatermarkStateFile::new(dir.path().join("watermark.json"));

    let store = FakeStore::with(vec![rec("a", 2), rec("b", 6)]);
    let index = FakeIndex::default();
    index.put("a", 2);
    let sink = RecordingSink::default();
    store.fail_next(1);

    let engine = ReconcileEngine::new(store.clone(), index.clone(), TimeWatermark::new(t(0)), 5000);
    let mut pipeline = Pipeline::new(engine, sink.clone()).with_state_file(state.clone());

    assert_eq!(pipeline.pass().await, PassOutcome::Skipped);
    assert!(state.load().await.unwrap().is_none(), "skipped pass persists nothing");

    assert_eq!(
        pipeline.pass().await,
        PassOutcome::Committed(TimeWatermark::new(t(6)))
    );
    assert_eq!(sink.reports.lock().unwrap()[0].missing_count(), 1);
    assert_eq!(
        state.load().await.unwrap().unwrap().watermark,
        TimeWatermark::new(t(6))
    );
}
