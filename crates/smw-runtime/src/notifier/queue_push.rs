use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ChangeNotifier, NotifierError, Tick, TickSource};

/// One message taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDelivery {
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Queue transport seam.
#[async_trait::async_trait]
pub trait QueueSource: Send {
    /// Next delivered message. `Ok(None)` when the subscription has ended.
    async fn recv(&mut self) -> Result<Option<QueueDelivery>, NotifierError>;

    async fn ack(&mut self, delivery: &QueueDelivery) -> Result<(), NotifierError>;
}

/// Ticks once per delivered message.
///
/// Delivery is at-most-once: a message is acknowledged as soon as it is
/// received, before its Tick reaches the worker. A crash between ack and pass
/// loses that trigger; the next message or restart covers it.
pub struct QueuePushNotifier<Q> {
    source: Q,
}

impl<Q: QueueSource> QueuePushNotifier<Q> {
    pub fn new(source: Q) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<Q: QueueSource> ChangeNotifier for QueuePushNotifier<Q> {
    fn name(&self) -> &'static str {
        "queue"
    }

    async fn next_tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<Tick>, NotifierError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            res = self.source.recv() => match res? {
                Some(d) => d,
                None => return Err(NotifierError::Queue("subscription ended".to_string())),
            },
        };

        if let Err(e) = self.source.ack(&delivery).await {
            // The message was received; the worst case is a redelivery and
            // one extra pass.
            warn!(error = %e, partition = delivery.partition, offset = delivery.offset, "queue ack failed");
        }

        let hint = message_hint(&delivery.payload);
        debug!(partition = delivery.partition, offset = delivery.offset, hint = ?hint, "queue message");
        Ok(Some(Tick {
            source: TickSource::QueuePush,
            hint,
        }))
    }
}

/// `identifier`, `id` or `pid` from a JSON object body.
fn message_hint(payload: &[u8]) -> Option<String> {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(payload) else {
        return None;
    };
    ["identifier", "id", "pid"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(feature = "kafka")]
pub mod kafka {
    use rdkafka::config::ClientConfig;
    use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
    use rdkafka::message::Message;
    use rdkafka::{Offset, TopicPartitionList};
    use tracing::info;

    use super::{QueueDelivery, QueueSource};
    use crate::notifier::NotifierError;

    /// Kafka topic subscription with manual offset commits.
    pub struct KafkaQueueSource {
        consumer: StreamConsumer,
        topic: String,
    }

    impl KafkaQueueSource {
        pub fn connect(brokers: &str, topic: &str, group_id: &str) -> Result<Self, NotifierError> {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("group.id", group_id)
                .set("auto.offset.reset", "latest")
                .set("enable.auto.commit", "false")
                .set("session.timeout.ms", "30000")
                .create()
                .map_err(|e| NotifierError::Queue(format!("connect {brokers}: {e}")))?;

            consumer
                .subscribe(&[topic])
                .map_err(|e| NotifierError::Queue(format!("subscribe {topic}: {e}")))?;

            info!(brokers, topic, group_id, "subscribed to change queue");
            Ok(Self {
                consumer,
                topic: topic.to_string(),
            })
        }
    }

    #[async_trait::async_trait]
    impl QueueSource for KafkaQueueSource {
        async fn recv(&mut self) -> Result<Option<QueueDelivery>, NotifierError> {
            let msg = self
                .consumer
                .recv()
                .await
                .map_err(|e| NotifierError::Queue(e.to_string()))?;
            Ok(Some(QueueDelivery {
                payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                partition: msg.partition(),
                offset: msg.offset(),
            }))
        }

        async fn ack(&mut self, delivery: &QueueDelivery) -> Result<(), NotifierError> {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(
                &self.topic,
                delivery.partition,
                Offset::Offset(delivery.offset + 1),
            )
            .map_err(|e| NotifierError::Queue(e.to_string()))?;
            self.consumer
                .commit(&tpl, CommitMode::Async)
                .map_err(|e| NotifierError::Queue(e.to_string()))
        }
    }
}
