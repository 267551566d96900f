use std::sync::Arc;

use domain::{
    ChatMessage, ConversationId, ConversationRepository, DomainError, EventReader, EventSender,
    MessageContent, MessageId, MessageRepository, MessageType, ServerEvent, UserId,
    UserRepository, rooms,
};
use tracing::{debug, info};

use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;

/// 实时聊天服务
///
/// 处理连接上的发消息与已读回执。实时路径不经过消息队列，
/// 落库后直接向会话房间广播（不回送给触发方本人）。
pub struct ChatService {
    users: Arc<dyn UserRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    broadcaster: Arc<dyn EventBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        broadcaster: Arc<dyn EventBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            conversations,
            messages,
            broadcaster,
            clock,
        }
    }

    /// 发送实时消息。发送者必须是会话参与者。
    pub async fn send_live_message(
        &self,
        sender_id: UserId,
        conversation_id: ConversationId,
        content: MessageContent,
    ) -> Result<ChatMessage, ApplicationError> {
        let now = self.clock.now();

        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::resource_not_found("conversation", conversation_id.to_string())
            })?;
        if !conversation.is_participant(sender_id) {
            return Err(DomainError::permission_denied("send message to conversation").into());
        }

        let sender = self
            .users
            .find_by_id(sender_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("user", sender_id.to_string()))?;

        let message = ChatMessage::new(
            MessageId::generate(),
            conversation_id,
            sender_id,
            content.clone(),
            MessageType::Text,
            now,
        );
        self.messages.insert(&message).await?;
        self.conversations
            .record_message(conversation_id, message.id, now)
            .await?;

        let event = ServerEvent::MessageReceived {
            id: message.id,
            content: content.as_str().to_string(),
            sender: EventSender {
                id: sender.id,
                username: sender.username.clone(),
                avatar: sender.avatar.clone(),
            },
            conversation_id,
            created_at: now,
            message_type: MessageType::Text.as_str().to_string(),
        };
        self.broadcaster
            .to_room_except(&rooms::conversation(conversation_id), sender_id, &event)
            .await?;

        info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            "live message sent"
        );
        Ok(message)
    }

    /// 标记消息已读。重复标记不重复广播。
    pub async fn mark_read(
        &self,
        reader_id: UserId,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        let now = self.clock.now();

        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("message", message_id.to_string()))?;

        let conversation = self
            .conversations
            .find_by_id(message.conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::resource_not_found(
                    "conversation",
                    message.conversation_id.to_string(),
                )
            })?;
        if !conversation.is_participant(reader_id) {
            return Err(DomainError::permission_denied("mark message as read").into());
        }

        let reader = self
            .users
            .find_by_id(reader_id)
            .await?
            .ok_or_else(|| DomainError::resource_not_found("user", reader_id.to_string()))?;

        let newly_read = self
            .messages
            .append_read_receipt(message_id, reader_id, now)
            .await?;
        if !newly_read {
            debug!(message_id = %message_id, reader_id = %reader_id, "duplicate read receipt ignored");
            return Ok(());
        }

        let event = ServerEvent::MessageReadBy {
            message_id,
            read_by: EventReader {
                id: reader.id,
                username: reader.username,
            },
            timestamp: now,
        };
        self.broadcaster
            .to_room_except(
                &rooms::conversation(message.conversation_id),
                reader_id,
                &event,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::memory::{RecordingBroadcaster, Target};
    use crate::clock::fixed::FixedClock;
    use crate::memory::{
        MemoryConversationRepository, MemoryMessageRepository, MemoryUserRepository,
    };
    use chrono::Utc;
    use domain::{Timestamp, User};

    struct Fixture {
        service: ChatService,
        conversations: Arc<MemoryConversationRepository>,
        messages: Arc<MemoryMessageRepository>,
        broadcaster: Arc<RecordingBroadcaster>,
        alice: User,
        bob: User,
        now: Timestamp,
    }

    fn user(username: &str, now: Timestamp) -> User {
        User {
            id: UserId::generate(),
            username: username.into(),
            email: format!("{username}@example.com"),
            avatar: None,
            is_active: true,
            is_online: true,
            last_seen: None,
            created_at: now,
        }
    }

    fn fixture() -> Fixture {
        let now = Utc::now();
        let users = Arc::new(MemoryUserRepository::new());
        let alice = user("alice", now);
        let bob = user("bob", now);
        users.add(alice.clone());
        users.add(bob.clone());

        let conversations = Arc::new(MemoryConversationRepository::new());
        let messages = Arc::new(MemoryMessageRepository::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let service = ChatService::new(
            users,
            conversations.clone(),
            messages.clone(),
            broadcaster.clone(),
            Arc::new(FixedClock::new(now)),
        );
        Fixture {
            service,
            conversations,
            messages,
            broadcaster,
            alice,
            bob,
            now,
        }
    }

    #[tokio::test]
    async fn live_message_is_persisted_and_broadcast_without_echo() {
        let f = fixture();
        let conversation = f
            .conversations
            .seed_direct(f.alice.id, f.bob.id, f.now);

        let message = f
            .service
            .send_live_message(
                f.alice.id,
                conversation.id,
                MessageContent::new("hello bob").unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(message.message_type, MessageType::Text);

        let sent = f.broadcaster.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            Target::RoomExcept(rooms::conversation(conversation.id), f.alice.id)
        );

        let stored = f.conversations.get(conversation.id).unwrap();
        assert_eq!(stored.last_message_id, Some(message.id));
    }

    #[tokio::test]
    async fn non_participant_cannot_send() {
        let f = fixture();
        let conversation = f.conversations.seed_direct(f.alice.id, f.bob.id, f.now);
        let outsider = UserId::generate();

        let result = f
            .service
            .send_live_message(
                outsider,
                conversation.id,
                MessageContent::new("hi").unwrap(),
            )
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::PermissionDenied { .. }))
        ));
        assert!(f.messages.all().is_empty());
    }

    #[tokio::test]
    async fn read_receipt_broadcasts_once_per_reader() {
        let f = fixture();
        let conversation = f.conversations.seed_direct(f.alice.id, f.bob.id, f.now);
        let message = f
            .service
            .send_live_message(
                f.alice.id,
                conversation.id,
                MessageContent::new("hello").unwrap(),
            )
            .await
            .unwrap();

        f.service.mark_read(f.bob.id, message.id).await.unwrap();
        f.service.mark_read(f.bob.id, message.id).await.unwrap();

        let events = f.broadcaster.events_named("message_read_by");
        assert_eq!(events.len(), 1);

        let stored = f.messages.get(message.id).unwrap();
        assert_eq!(stored.read_by.len(), 1);
        assert_eq!(stored.read_by[0].user_id, f.bob.id);
    }

    #[tokio::test]
    async fn reading_unknown_message_is_not_found() {
        let f = fixture();
        let result = f.service.mark_read(f.bob.id, MessageId::generate()).await;
        assert!(matches!(result, Err(ApplicationError::Domain(_))));
    }
}
