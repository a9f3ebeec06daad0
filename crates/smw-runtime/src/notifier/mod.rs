//! Change notifiers.
//!
//! Every trigger mechanism (fixed-interval poll, store LISTEN channel,
//! message queue) is reduced to the same [`Tick`]. The worker only sees the
//! [`ChangeNotifier`] trait and never knows which mechanism is behind it.

mod db_push;
mod queue_push;
mod timer;

use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use db_push::{DbPushNotifier, NotificationSource};
pub use queue_push::{QueueDelivery, QueuePushNotifier, QueueSource};
pub use timer::TimerNotifier;

#[cfg(feature = "kafka")]
pub use queue_push::kafka::KafkaQueueSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    Timer,
    DatabasePush,
    /// No notification arrived within the idle timeout.
    DatabaseIdle,
    QueuePush,
}

impl TickSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickSource::Timer => "timer",
            TickSource::DatabasePush => "database_push",
            TickSource::DatabaseIdle => "database_idle",
            TickSource::QueuePush => "queue_push",
        }
    }
}

impl fmt::Display for TickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Something may have changed; run a pass."
///
/// `hint` is informational only (a notification payload or message
/// identifier). Passes never narrow their scope based on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub source: TickSource,
    pub hint: Option<String>,
}

impl Tick {
    pub fn new(source: TickSource) -> Self {
        Self { source, hint: None }
    }

    pub fn with_hint(source: TickSource, hint: impl Into<String>) -> Self {
        Self {
            source,
            hint: Some(hint.into()),
        }
    }
}

/// The notification mechanism failed in a way it cannot recover from.
/// Fatal: the worker stops and the process exits.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("store notification channel failed: {0}")]
    Listen(#[source] sqlx::Error),

    #[error("queue transport failed: {0}")]
    Queue(String),
}

/// Source of Ticks.
///
/// `Ok(None)` means cancellation was observed and the caller should stop.
/// Implementations must notice cancellation within a bounded time.
#[async_trait::async_trait]
pub trait ChangeNotifier: Send {
    fn name(&self) -> &'static str;

    async fn next_tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Tick>, NotifierError>;
}

#[async_trait::async_trait]
impl ChangeNotifier for Box<dyn ChangeNotifier> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn next_tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Tick>, NotifierError> {
        (**self).next_tick(cancel).await
    }
}
