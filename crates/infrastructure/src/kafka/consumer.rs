//! Kafka 消息消费者
//!
//! 消费主投递与重试两个主题。手动提交位点：只有在处理器
//! 给出持久化去向（落库、重试或死信）后才确认，处理中途
//! 失败的信封把消费位置拨回原位，等待重新消费。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use application::DeliveryProcessor;
use config::KafkaConfig;
use domain::MessageEnvelope;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::Offset;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::kafka::{KafkaError, KafkaResult};

/// 处理失败后重新拉取前的等待时间。
const RECOVERY_BACKOFF: Duration = Duration::from_secs(1);

/// 回拨消费位置的等待上限。
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DeliveryConsumer {
    consumer: StreamConsumer,
    processor: Arc<DeliveryProcessor>,
    shutdown_signal: Arc<AtomicBool>,
}

impl DeliveryConsumer {
    pub fn new(config: &KafkaConfig, processor: Arc<DeliveryProcessor>) -> KafkaResult<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("group.id", &config.consumer_group_id)
            .set("bootstrap.servers", config.brokers.join(","))
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "10000")
            .set("heartbeat.interval.ms", "3000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");

        let consumer: StreamConsumer =
            client_config.create().map_err(|e| KafkaError::ConfigError {
                message: format!("failed to create kafka consumer: {e}"),
            })?;

        consumer
            .subscribe(&[&config.delivery_topic, &config.retry_topic])
            .map_err(|e| KafkaError::ConsumerError {
                message: format!("failed to subscribe: {e}"),
            })?;

        info!(
            group = %config.consumer_group_id,
            topics = ?[&config.delivery_topic, &config.retry_topic],
            "kafka delivery consumer created"
        );

        Ok(Self {
            consumer,
            processor,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 消费循环，直到收到关闭信号。
    pub async fn run(&self) -> KafkaResult<()> {
        info!("delivery consumer loop started");

        while !self.shutdown_signal.load(Ordering::Relaxed) {
            let message = match self.consumer.recv().await {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "failed to receive from kafka");
                    sleep(RECOVERY_BACKOFF).await;
                    continue;
                }
            };

            let payload = match message.payload() {
                Some(bytes) => bytes,
                None => {
                    warn!("skipping message without payload");
                    self.consumer
                        .commit_message(&message, CommitMode::Async)
                        .map_err(KafkaError::from)?;
                    continue;
                }
            };

            let envelope: MessageEnvelope = match serde_json::from_slice(payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    // 无法解析的信封不可能通过重试修复，跳过并记录。
                    error!(error = %e, "skipping malformed envelope");
                    self.consumer
                        .commit_message(&message, CommitMode::Async)
                        .map_err(KafkaError::from)?;
                    continue;
                }
            };

            match self.processor.process(&envelope).await {
                Ok(outcome) => {
                    debug!(outcome = ?outcome, deferred_id = ?envelope.id, "envelope processed");
                    self.consumer
                        .commit_message(&message, CommitMode::Async)
                        .map_err(KafkaError::from)?;
                }
                Err(e) => {
                    // 去向未定：位点不提交，还要把消费位置拨回本条，
                    // 否则后续消息的提交会隐式越过它。
                    error!(error = %e, deferred_id = ?envelope.id, "envelope left uncommitted");
                    self.consumer
                        .seek(
                            message.topic(),
                            message.partition(),
                            Offset::Offset(message.offset()),
                            SEEK_TIMEOUT,
                        )
                        .map_err(|seek_err| KafkaError::ConsumerError {
                            message: format!(
                                "failed to rewind {}[{}] to offset {}: {seek_err}",
                                message.topic(),
                                message.partition(),
                                message.offset()
                            ),
                        })?;
                    sleep(RECOVERY_BACKOFF).await;
                }
            }
        }

        info!("delivery consumer loop stopped");
        Ok(())
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown_signal.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
        info!("delivery consumer shutdown requested");
    }
}
