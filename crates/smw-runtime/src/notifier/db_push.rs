use std::time::Duration;

use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ChangeNotifier, NotifierError, Tick, TickSource};

/// Stream of store change notifications (payload strings).
#[async_trait::async_trait]
pub trait NotificationSource: Send {
    async fn recv(&mut self) -> Result<String, NotifierError>;
}

#[async_trait::async_trait]
impl NotificationSource for PgListener {
    async fn recv(&mut self) -> Result<String, NotifierError> {
        let notification = PgListener::recv(self).await.map_err(NotifierError::Listen)?;
        Ok(notification.payload().to_string())
    }
}

/// Ticks on every store notification, and on every `idle_timeout` of silence
/// so a missed notification delays a pass by at most that long.
pub struct DbPushNotifier<S> {
    source: S,
    idle_timeout: Duration,
}

impl<S: NotificationSource> DbPushNotifier<S> {
    pub fn new(source: S, idle_timeout: Duration) -> Self {
        Self {
            source,
            idle_timeout,
        }
    }
}

#[async_trait::async_trait]
impl<S: NotificationSource> ChangeNotifier for DbPushNotifier<S> {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn next_tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Tick>, NotifierError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            res = tokio::time::timeout(self.idle_timeout, self.source.recv()) => match res {
                Err(_elapsed) => Ok(Some(Tick::new(TickSource::DatabaseIdle))),
                Ok(Ok(payload)) if payload.is_empty() => {
                    debug!("store notification");
                    Ok(Some(Tick::new(TickSource::DatabasePush)))
                }
                Ok(Ok(payload)) => {
                    debug!(payload = %payload, "store notification");
                    Ok(Some(Tick::with_hint(TickSource::DatabasePush, payload)))
                }
                Ok(Err(e)) => Err(e),
            },
        }
    }
}
