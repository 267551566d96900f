use async_trait::async_trait;
use domain::MessageEnvelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl QueueError {
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }
}

/// 消息队列端口（Producer 侧）
///
/// 三个入口对应三条队列：主投递、重试、死信。
/// 所有发布都要求持久化投递，实现方在投递确认前不得返回成功。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 首次发布到主投递队列，信封重试计数为 0。
    async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), QueueError>;

    /// 发布到重试队列；调用方负责在信封上递增计数。
    async fn publish_retry(&self, envelope: &MessageEnvelope) -> Result<(), QueueError>;

    /// 发布到死信队列，附带失败原因与时间戳。
    async fn publish_dead_letter(
        &self,
        envelope: &MessageEnvelope,
        reason: &str,
    ) -> Result<(), QueueError>;
}

/// 内存队列实现（测试用）：按队列分别记录发布的信封。
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryMessageQueue {
        delivery: Mutex<Vec<MessageEnvelope>>,
        retry: Mutex<Vec<MessageEnvelope>>,
        dead_letter: Mutex<Vec<(MessageEnvelope, String)>>,
        fail_publishes: AtomicBool,
    }

    impl MemoryMessageQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// 让后续 publish 调用失败，模拟 broker 不可达。
        pub fn set_fail_publishes(&self, fail: bool) {
            self.fail_publishes.store(fail, Ordering::SeqCst);
        }

        pub fn delivery_queue(&self) -> Vec<MessageEnvelope> {
            self.delivery.lock().unwrap().clone()
        }

        pub fn retry_queue(&self) -> Vec<MessageEnvelope> {
            self.retry.lock().unwrap().clone()
        }

        pub fn dead_letter_queue(&self) -> Vec<(MessageEnvelope, String)> {
            self.dead_letter.lock().unwrap().clone()
        }

        /// 取出主队列队首（模拟消费）。
        pub fn pop_delivery(&self) -> Option<MessageEnvelope> {
            let mut queue = self.delivery.lock().unwrap();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        }

        /// 取出重试队列队首。
        pub fn pop_retry(&self) -> Option<MessageEnvelope> {
            let mut queue = self.retry.lock().unwrap();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        }

        fn check_failure(&self) -> Result<(), QueueError> {
            if self.fail_publishes.load(Ordering::SeqCst) {
                return Err(QueueError::publish("simulated broker failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MessageQueue for MemoryMessageQueue {
        async fn publish(&self, envelope: &MessageEnvelope) -> Result<(), QueueError> {
            self.check_failure()?;
            self.delivery.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn publish_retry(&self, envelope: &MessageEnvelope) -> Result<(), QueueError> {
            self.check_failure()?;
            self.retry.lock().unwrap().push(envelope.clone());
            Ok(())
        }

        async fn publish_dead_letter(
            &self,
            envelope: &MessageEnvelope,
            reason: &str,
        ) -> Result<(), QueueError> {
            self.check_failure()?;
            self.dead_letter
                .lock()
                .unwrap()
                .push((envelope.clone(), reason.to_string()));
            Ok(())
        }
    }
}
