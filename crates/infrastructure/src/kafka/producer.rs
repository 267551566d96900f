//! Kafka 消息生产者
//!
//! 使用 conversation_id 作为分区键，确保同一会话信封的有序性。
//! 开启 acks=all 与幂等性，发送在 broker 确认前不返回成功。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use config::KafkaConfig;
use domain::MessageEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use application::queue::{MessageQueue, QueueError};

use crate::kafka::{KafkaError, KafkaResult, RETRY_COUNT_HEADER};

/// Kafka 队列实现
///
/// 三个主题分别承载主投递、重试与死信流量。
pub struct KafkaMessageQueue {
    producer: FutureProducer,
    delivery_topic: String,
    retry_topic: String,
    dead_letter_topic: String,
    send_timeout: Duration,
}

impl KafkaMessageQueue {
    pub fn new(config: &KafkaConfig) -> KafkaResult<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("message.timeout.ms", config.send_timeout_ms.to_string())
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5");

        let producer: FutureProducer =
            client_config.create().map_err(|e| KafkaError::ConfigError {
                message: format!("failed to create kafka producer: {e}"),
            })?;

        info!(brokers = %config.brokers.join(","), "kafka producer created");

        Ok(Self {
            producer,
            delivery_topic: config.delivery_topic.clone(),
            retry_topic: config.retry_topic.clone(),
            dead_letter_topic: config.dead_letter_topic.clone(),
            send_timeout: Duration::from_millis(u64::from(config.send_timeout_ms)),
        })
    }

    async fn send_envelope(
        &self,
        topic: &str,
        envelope: &MessageEnvelope,
        extra_headers: &[(&str, String)],
    ) -> KafkaResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let partition_key = envelope.conversation_id.to_string();

        let mut headers = OwnedHeaders::new().insert(Header {
            key: RETRY_COUNT_HEADER,
            value: Some(&envelope.retry_count.to_string()),
        });
        for (key, value) in extra_headers {
            headers = headers.insert(Header {
                key: *key,
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(&partition_key)
            .payload(&payload)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| {
                warn!(topic, error = %e, "kafka publish failed");
                KafkaError::ProducerError {
                    message: format!("failed to publish to {topic}: {e}"),
                }
            })?;

        debug!(
            topic,
            conversation_id = %envelope.conversation_id,
            retry_count = envelope.retry_count,
            "envelope published"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for KafkaMessageQueue {
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), QueueError> {
        self.send_envelope(&self.delivery_topic, envelope, &[])
            .await
            .map_err(|e| QueueError::publish(e.to_string()))
    }

    async fn publish_retry(&self, envelope: &MessageEnvelope) -> Result<(), QueueError> {
        self.send_envelope(&self.retry_topic, envelope, &[])
            .await
            .map_err(|e| QueueError::publish(e.to_string()))
    }

    async fn publish_dead_letter(
        &self,
        envelope: &MessageEnvelope,
        reason: &str,
    ) -> Result<(), QueueError> {
        // 信封上的 timestamp 是最后一次发布时间，失败时刻单独携带。
        self.send_envelope(
            &self.dead_letter_topic,
            envelope,
            &[
                ("x-failure-reason", reason.to_string()),
                ("x-failed-at", Utc::now().to_rfc3339()),
            ],
        )
        .await
        .map_err(|e| QueueError::publish(e.to_string()))
    }
}
