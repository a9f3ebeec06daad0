use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ChangeNotifier, NotifierError, Tick, TickSource};

/// Fixed-interval poll. The first Tick is immediate.
///
/// Intervals are measured from the previous Tick; a pass that overruns the
/// interval is followed by one Tick straight away, not a burst.
pub struct TimerNotifier {
    ticker: tokio::time::Interval,
}

impl TimerNotifier {
    pub fn new(interval: Duration) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now(), interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }
}

#[async_trait::async_trait]
impl ChangeNotifier for TimerNotifier {
    fn name(&self) -> &'static str {
        "timer"
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
            _ = self.ticker.tick() => Ok(Some(Tick::new(TickSource::Timer))),
        }
    }
}
