use serde::{Deserialize, Serialize};

use crate::deferred::DeferredMessage;
use crate::value_objects::{
    ConversationId, DeferredMessageId, MessageContent, Timestamp, UserId,
};

/// 投递达到该重试次数后转入死信队列。
pub const MAX_DELIVERY_RETRIES: u32 = 3;

/// 死信原因：重试耗尽。
pub const REASON_MAX_RETRY_EXCEEDED: &str = "Max retry count exceeded";

/// 经由消息队列传输的投递信封
///
/// 只存活在队列中，首次发布时由 DeferredMessage 构建；
/// `id` 为空表示实时路径消息（不回写延迟记录）。
/// 字段名即线上格式，不可改动。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: Option<DeferredMessageId>,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub conversation_id: ConversationId,
    pub send_date: Timestamp,
    pub retry_count: u32,
    pub timestamp: Timestamp,
}

impl MessageEnvelope {
    /// 首次发布：从延迟记录构建，重试计数归零。
    pub fn from_deferred(record: &DeferredMessage, now: Timestamp) -> Self {
        Self {
            id: Some(record.id),
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content.clone(),
            conversation_id: record.conversation_id,
            send_date: record.send_date,
            retry_count: 0,
            timestamp: now,
        }
    }

    /// 重试发布：携带计数加一的新信封。
    pub fn for_retry(&self, now: Timestamp) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            timestamp: now,
            ..self.clone()
        }
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= MAX_DELIVERY_RETRIES
    }
}
