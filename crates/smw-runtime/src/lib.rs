//! smw-runtime
//!
//! Async orchestration around the pure reconciliation core: the engine that
//! runs one pass against the store and index, the change notifiers that
//! decide when a pass runs, report sinks, the persisted watermark, and the
//! worker loop that ties them together.

pub mod engine;
pub mod notifier;
pub mod shutdown;
pub mod sink;
pub mod state;
pub mod worker;

pub use engine::{PassError, ReconcileEngine};
pub use notifier::{
    ChangeNotifier, DbPushNotifier, NotificationSource, NotifierError, QueueDelivery,
    QueuePushNotifier, QueueSource, Tick, TickSource, TimerNotifier,
};
pub use shutdown::spawn_signal_bridge;
pub use sink::{JsonlFileSink, MultiSink, ReportSink, StdoutSink};
pub use state::{WatermarkState, WatermarkStateFile};
pub use worker::{PassOutcome, Pipeline, Worker, WorkerStats};

#[cfg(feature = "kafka")]
pub use notifier::KafkaQueueSource;
