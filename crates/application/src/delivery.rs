use std::sync::Arc;

use domain::{
    ChatMessage, ConversationRepository, DeferredMessageRepository, EventSender,
    MessageEnvelope, MessageId, MessageRepository, MessageType, ServerEvent, UserRepository,
    rooms, REASON_MAX_RETRY_EXCEEDED,
};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::queue::MessageQueue;

/// 一个信封处理完毕后的去向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// 投递成功，消息已落库并广播。
    Delivered,
    /// 投递失败，已带计数重新发布到重试队列。
    Retried { attempt: u32 },
    /// 重试耗尽，已转入死信队列。
    DeadLettered,
}

/// 投递处理器
///
/// 消费主队列与重试队列上的信封。返回 `Ok` 表示信封已经
/// 有了持久化的去向（落库、重试队列或死信队列），调用方
/// 此时才能确认消费位点；返回 `Err` 表示去向未定，位点
/// 不得推进，信封会被重新消费。
pub struct DeliveryProcessor {
    users: Arc<dyn UserRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    deferred: Arc<dyn DeferredMessageRepository>,
    queue: Arc<dyn MessageQueue>,
    broadcaster: Arc<dyn crate::broadcaster::EventBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl DeliveryProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserRepository>,
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        deferred: Arc<dyn DeferredMessageRepository>,
        queue: Arc<dyn MessageQueue>,
        broadcaster: Arc<dyn crate::broadcaster::EventBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            conversations,
            messages,
            deferred,
            queue,
            broadcaster,
            clock,
        }
    }

    pub async fn process(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<DeliveryOutcome, ApplicationError> {
        if envelope.retries_exhausted() {
            warn!(
                deferred_id = ?envelope.id,
                retry_count = envelope.retry_count,
                "retries exhausted, routing envelope to dead letter queue"
            );
            self.queue
                .publish_dead_letter(envelope, REASON_MAX_RETRY_EXCEEDED)
                .await?;
            return Ok(DeliveryOutcome::DeadLettered);
        }

        match self.deliver(envelope).await {
            Ok(()) => Ok(DeliveryOutcome::Delivered),
            Err(err) => {
                let now = self.clock.now();
                let retry = envelope.for_retry(now);
                error!(
                    deferred_id = ?envelope.id,
                    attempt = retry.retry_count,
                    error = %err,
                    "delivery failed, republishing to retry queue"
                );
                // 重发失败时向上冒泡，调用方不得确认位点。
                self.queue.publish_retry(&retry).await?;
                Ok(DeliveryOutcome::Retried {
                    attempt: retry.retry_count,
                })
            }
        }
    }

    async fn deliver(&self, envelope: &MessageEnvelope) -> Result<(), ApplicationError> {
        let now = self.clock.now();

        let sender = self
            .users
            .find_by_id(envelope.sender_id)
            .await?
            .ok_or_else(|| {
                ApplicationError::infrastructure(format!(
                    "sender {} not found for delivery",
                    envelope.sender_id
                ))
            })?;

        let message = ChatMessage::new(
            MessageId::generate(),
            envelope.conversation_id,
            envelope.sender_id,
            envelope.content.clone(),
            MessageType::Auto,
            now,
        );
        self.messages.insert(&message).await?;
        self.conversations
            .record_message(envelope.conversation_id, message.id, now)
            .await?;

        let event = ServerEvent::MessageReceived {
            id: message.id,
            content: envelope.content.as_str().to_string(),
            sender: EventSender {
                id: sender.id,
                username: sender.username.clone(),
                avatar: sender.avatar.clone(),
            },
            conversation_id: envelope.conversation_id,
            created_at: now,
            message_type: MessageType::Auto.as_str().to_string(),
        };
        self.broadcaster
            .to_room(&rooms::conversation(envelope.conversation_id), &event)
            .await?;

        if let Some(deferred_id) = envelope.id {
            self.deferred.mark_sent(deferred_id, now).await?;
        }

        info!(
            message_id = %message.id,
            conversation_id = %envelope.conversation_id,
            deferred_id = ?envelope.id,
            "deferred message delivered"
        );
        Ok(())
    }
}
