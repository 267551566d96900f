//! 内存仓储实现
//!
//! 单元测试与端到端场景测试使用的进程内存储，
//! 行为与数据库实现对齐（含认领的原子语义）。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{
    ActiveUser, ChatMessage, Conversation, ConversationId, ConversationRepository,
    DeferredMessage, DeferredMessageId, DeferredMessageRepository, DueDeferredMessage,
    MessageId, MessageRepository, RepositoryError, Timestamp, User, UserDisplay,
    UserId, UserRepository, normalize_pair,
};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<ActiveUser>, RepositoryError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.is_active)
            .map(|u| ActiveUser {
                id: u.id,
                username: u.username.clone(),
            })
            .collect())
    }

    async fn find_displays(&self, ids: &[UserId]) -> Result<Vec<UserDisplay>, RepositoryError> {
        let users = self.users.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| users.get(id))
            .map(|u| u.display())
            .collect())
    }

    async fn set_online(
        &self,
        id: UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.is_online = online;
            user.last_seen = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConversationRepository {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    fail_next_creates: Mutex<usize>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来 `n` 次 find_or_create_direct 调用失败。
    pub fn fail_next_creates(&self, n: usize) {
        *self.fail_next_creates.lock().unwrap() = n;
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(&id).cloned()
    }

    /// 测试预置会话。
    pub fn seed_direct(&self, first: UserId, second: UserId, now: Timestamp) -> Conversation {
        let conversation =
            Conversation::new_direct(ConversationId::generate(), first, second, now)
                .expect("seeded participants must be distinct");
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        conversation
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.conversations.lock().unwrap().get(&id).cloned())
    }

    async fn find_or_create_direct(
        &self,
        first: UserId,
        second: UserId,
        now: Timestamp,
    ) -> Result<Conversation, RepositoryError> {
        {
            let mut remaining = self.fail_next_creates.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RepositoryError::storage("conversation store unavailable"));
            }
        }
        let pair = normalize_pair(first, second);
        let mut conversations = self.conversations.lock().unwrap();
        if let Some(existing) = conversations
            .values()
            .find(|c| (c.participant_a, c.participant_b) == pair)
        {
            return Ok(existing.clone());
        }
        let conversation = Conversation::new_direct(ConversationId::generate(), first, second, now)
            .map_err(|e| RepositoryError::conflict(e.to_string()))?;
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn record_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(&conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        conversation.record_message(message_id, at);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: Mutex<HashMap<MessageId, ChatMessage>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ChatMessage> {
        let mut all: Vec<ChatMessage> =
            self.messages.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|m| m.created_at);
        all
    }

    pub fn get(&self, id: MessageId) -> Option<ChatMessage> {
        self.messages.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    async fn append_read_receipt(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages.get_mut(&message_id).ok_or(RepositoryError::NotFound)?;
        Ok(message.mark_read_by(user_id, at))
    }
}

#[derive(Default)]
pub struct MemoryDeferredRepository {
    records: Mutex<HashMap<DeferredMessageId, DeferredMessage>>,
    usernames: Mutex<HashMap<UserId, String>>,
    fail_releases: Mutex<bool>,
}

impl MemoryDeferredRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: DeferredMessage) {
        self.records.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, id: DeferredMessageId) -> Option<DeferredMessage> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<DeferredMessage> {
        let mut all: Vec<DeferredMessage> =
            self.records.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }

    pub fn set_fail_releases(&self, fail: bool) {
        *self.fail_releases.lock().unwrap() = fail;
    }

    /// 认领结果中展示的用户名，未登记时退回 id 文本。
    pub fn set_username(&self, id: UserId, username: impl Into<String>) {
        self.usernames.lock().unwrap().insert(id, username.into());
    }

    fn username_of(&self, id: UserId) -> String {
        self.usernames
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

#[async_trait]
impl DeferredMessageRepository for MemoryDeferredRepository {
    async fn bulk_insert(&self, records: &[DeferredMessage]) -> Result<usize, RepositoryError> {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.id, record.clone());
        }
        Ok(records.len())
    }

    async fn claim_due(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DueDeferredMessage>, RepositoryError> {
        let mut records = self.records.lock().unwrap();
        let mut due_ids: Vec<DeferredMessageId> = records
            .values()
            .filter(|r| r.is_due(now))
            .map(|r| r.id)
            .collect();
        due_ids.sort_by_key(|id| records[id].send_date);
        due_ids.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            if let Some(record) = records.get_mut(&id) {
                record.mark_queued(now);
                claimed.push(record.clone());
            }
        }
        drop(records);

        Ok(claimed
            .into_iter()
            .map(|record| {
                let sender_username = self.username_of(record.sender_id);
                let receiver_username = self.username_of(record.receiver_id);
                DueDeferredMessage {
                    record,
                    sender_username,
                    receiver_username,
                }
            })
            .collect())
    }

    async fn release_claim(
        &self,
        id: DeferredMessageId,
        error: &str,
    ) -> Result<(), RepositoryError> {
        if *self.fail_releases.lock().unwrap() {
            return Err(RepositoryError::storage("deferred store unavailable"));
        }
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record.record_failure(error);
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: DeferredMessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        record
            .mark_sent(at)
            .map_err(|e| RepositoryError::conflict(e.to_string()))
    }

    async fn find_by_id(
        &self,
        id: DeferredMessageId,
    ) -> Result<Option<DeferredMessage>, RepositoryError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }
}
