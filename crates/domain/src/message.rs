use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// 消息类型：实时发送或计划任务自动生成。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Auto,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Auto => "auto",
        }
    }
}

/// 已读回执，按用户去重，只增不减。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: Timestamp,
}

/// 持久化的聊天消息
///
/// 除已读列表外不可变更；删除为软删除标记。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub read_by: Vec<ReadReceipt>,
    #[serde(skip_serializing, default)] // 删除标记不暴露给客户端
    pub is_deleted: bool,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        message_type: MessageType,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            message_type,
            read_by: Vec::new(),
            is_deleted: false,
            created_at,
        }
    }

    /// 追加已读回执；同一用户重复标记不产生新条目。
    /// 返回是否产生了新的回执。
    pub fn mark_read_by(&mut self, user_id: UserId, at: Timestamp) -> bool {
        if self.read_by.iter().any(|r| r.user_id == user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id,
            read_at: at,
        });
        true
    }
}
