use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 一对一会话
///
/// 参与者按排序后的顺序存储，保证同一无序用户对
/// 只会解析到同一个会话（配合 find_or_create 操作）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant_a: UserId,
    pub participant_b: UserId,
    pub last_message_id: Option<MessageId>,
    pub last_message_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Conversation {
    pub fn new_direct(
        id: ConversationId,
        first: UserId,
        second: UserId,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if first == second {
            return Err(DomainError::business_rule_violation(
                "direct conversation requires two distinct participants",
            ));
        }
        let (participant_a, participant_b) = normalize_pair(first, second);
        Ok(Self {
            id,
            participant_a,
            participant_b,
            last_message_id: None,
            last_message_at: None,
            created_at,
        })
    }

    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// 消息投递后推进最后消息指针。
    pub fn record_message(&mut self, message_id: MessageId, at: Timestamp) {
        self.last_message_id = Some(message_id);
        self.last_message_at = Some(at);
    }
}

/// 将无序用户对规范化为固定顺序。
pub fn normalize_pair(first: UserId, second: UserId) -> (UserId, UserId) {
    if first.0 <= second.0 {
        (first, second)
    } else {
        (second, first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::generate()
    }

    #[test]
    fn pair_order_is_normalized() {
        let a = UserId::from(Uuid::from_u128(1));
        let b = UserId::from(Uuid::from_u128(2));

        let forward = Conversation::new_direct(ConversationId::generate(), a, b, Utc::now()).unwrap();
        let reverse = Conversation::new_direct(ConversationId::generate(), b, a, Utc::now()).unwrap();

        assert_eq!(forward.participant_a, reverse.participant_a);
        assert_eq!(forward.participant_b, reverse.participant_b);
    }

    #[test]
    fn rejects_self_conversation() {
        let me = user();
        let result = Conversation::new_direct(ConversationId::generate(), me, me, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn record_message_updates_pointer() {
        let mut conversation =
            Conversation::new_direct(ConversationId::generate(), user(), user(), Utc::now())
                .unwrap();
        assert!(conversation.last_message_id.is_none());

        let message_id = MessageId::generate();
        let at = Utc::now();
        conversation.record_message(message_id, at);

        assert_eq!(conversation.last_message_id, Some(message_id));
        assert_eq!(conversation.last_message_at, Some(at));
    }

    #[test]
    fn participant_check() {
        let a = user();
        let b = user();
        let conversation =
            Conversation::new_direct(ConversationId::generate(), a, b, Utc::now()).unwrap();
        assert!(conversation.is_participant(a));
        assert!(conversation.is_participant(b));
        assert!(!conversation.is_participant(user()));
    }
}
