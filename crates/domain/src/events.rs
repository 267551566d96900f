//! 实时事件模型
//!
//! 事件名与载荷字段是客户端契约，必须逐字对齐，不可重命名。

use serde::{Deserialize, Serialize};

use crate::user::UserDisplay;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 事件载荷中的发送者摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSender {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
}

/// 已读回执载荷中的读者摘要。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReader {
    pub id: UserId,
    pub username: String,
}

/// 服务端推送给客户端的实时事件。
///
/// 只做序列化：线上帧由 [`ServerEvent::to_frame`] 统一构造。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        id: MessageId,
        content: String,
        sender: EventSender,
        conversation_id: ConversationId,
        created_at: Timestamp,
        message_type: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageReadBy {
        message_id: MessageId,
        read_by: EventReader,
        timestamp: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: UserId,
        username: String,
        conversation_id: ConversationId,
        timestamp: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    UserStopTyping {
        user_id: UserId,
        username: String,
        conversation_id: ConversationId,
        timestamp: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    UserOnline {
        user_id: UserId,
        username: String,
        timestamp: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    UserOffline {
        user_id: UserId,
        username: String,
        timestamp: Timestamp,
    },
    OnlineUsersList {
        users: Vec<UserDisplay>,
        count: usize,
        timestamp: Timestamp,
    },
    OnlineUsersUpdate {
        users: Vec<UserDisplay>,
        count: usize,
        timestamp: Timestamp,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// 线上事件名，逐字对齐客户端契约。
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::MessageReceived { .. } => "message_received",
            ServerEvent::MessageReadBy { .. } => "message_read_by",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
            ServerEvent::UserOnline { .. } => "user_online",
            ServerEvent::UserOffline { .. } => "user_offline",
            ServerEvent::OnlineUsersList { .. } => "online_users_list",
            ServerEvent::OnlineUsersUpdate { .. } => "online_users_update",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// 序列化为线上帧：`{"event": <名称>, "data": <载荷>}`。
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let frame = serde_json::json!({
            "event": self.event_name(),
            "data": self,
        });
        serde_json::to_string(&frame)
    }
}

/// 事件广播的目标房间命名。
pub mod rooms {
    use super::{ConversationId, UserId};

    /// 会话房间：接收该会话全部事件。
    pub fn conversation(id: ConversationId) -> String {
        format!("conversation:{id}")
    }

    /// 用户个人房间。
    pub fn user(id: UserId) -> String {
        format!("user:{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn message_received_payload_shape() {
        let event = ServerEvent::MessageReceived {
            id: MessageId::generate(),
            content: "Hi".into(),
            sender: EventSender {
                id: UserId::generate(),
                username: "alice".into(),
                avatar: None,
            },
            conversation_id: ConversationId::generate(),
            created_at: Utc::now(),
            message_type: "auto".into(),
        };

        assert_eq!(event.event_name(), "message_received");

        let frame: serde_json::Value =
            serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["event"], "message_received");

        let data = &frame["data"];
        for key in ["id", "content", "sender", "conversationId", "createdAt", "messageType"] {
            assert!(data.get(key).is_some(), "missing field {key}");
        }
        for key in ["id", "username", "avatar"] {
            assert!(data["sender"].get(key).is_some(), "missing sender field {key}");
        }
    }

    #[test]
    fn read_receipt_payload_shape() {
        let event = ServerEvent::MessageReadBy {
            message_id: MessageId::generate(),
            read_by: EventReader {
                id: UserId::generate(),
                username: "bob".into(),
            },
            timestamp: Utc::now(),
        };

        let frame: serde_json::Value =
            serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["event"], "message_read_by");
        assert!(frame["data"]["messageId"].is_string());
        assert!(frame["data"]["readBy"]["username"].is_string());
    }

    #[test]
    fn typing_and_presence_event_names() {
        let now = Utc::now();
        let user_id = UserId::generate();
        let conversation_id = ConversationId::generate();

        let typing = ServerEvent::UserTyping {
            user_id,
            username: "alice".into(),
            conversation_id,
            timestamp: now,
        };
        let stop = ServerEvent::UserStopTyping {
            user_id,
            username: "alice".into(),
            conversation_id,
            timestamp: now,
        };
        let online = ServerEvent::UserOnline {
            user_id,
            username: "alice".into(),
            timestamp: now,
        };
        let offline = ServerEvent::UserOffline {
            user_id,
            username: "alice".into(),
            timestamp: now,
        };

        assert_eq!(typing.event_name(), "user_typing");
        assert_eq!(stop.event_name(), "user_stop_typing");
        assert_eq!(online.event_name(), "user_online");
        assert_eq!(offline.event_name(), "user_offline");

        let frame: serde_json::Value =
            serde_json::from_str(&typing.to_frame().unwrap()).unwrap();
        for key in ["userId", "username", "conversationId", "timestamp"] {
            assert!(frame["data"].get(key).is_some(), "missing field {key}");
        }
    }

    #[test]
    fn roster_events_carry_users_and_count() {
        let event = ServerEvent::OnlineUsersUpdate {
            users: vec![],
            count: 0,
            timestamp: Utc::now(),
        };

        let frame: serde_json::Value =
            serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["event"], "online_users_update");
        assert!(frame["data"]["users"].is_array());
        assert_eq!(frame["data"]["count"], 0);
    }

    #[test]
    fn room_naming() {
        let conversation_id = ConversationId::generate();
        let user_id = UserId::generate();
        assert_eq!(
            rooms::conversation(conversation_id),
            format!("conversation:{conversation_id}")
        );
        assert_eq!(rooms::user(user_id), format!("user:{user_id}"));
    }
}
