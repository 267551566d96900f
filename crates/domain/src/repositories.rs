//! 仓储接口定义
//!
//! 存储是外部协作方，核心只通过这些窄接口访问；
//! 具体实现位于 infrastructure。

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::deferred::DeferredMessage;
use crate::errors::RepositoryError;
use crate::message::ChatMessage;
use crate::user::{ActiveUser, User, UserDisplay};
use crate::value_objects::{
    ConversationId, DeferredMessageId, MessageId, Timestamp, UserId,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// 计划任务使用的活跃用户投影。
    async fn list_active(&self) -> Result<Vec<ActiveUser>, RepositoryError>;

    /// 在线列表使用的展示字段，顺序不保证。
    async fn find_displays(&self, ids: &[UserId]) -> Result<Vec<UserDisplay>, RepositoryError>;

    /// 回写用户行上的在线标记与最后在线时间。
    /// 与在线集合之间只保证最终一致。
    async fn set_online(
        &self,
        id: UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    /// 按无序用户对解析一对一会话，不存在则创建。
    async fn find_or_create_direct(
        &self,
        first: UserId,
        second: UserId,
        now: Timestamp,
    ) -> Result<Conversation, RepositoryError>;

    /// 投递后推进会话的最后消息指针。
    async fn record_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &ChatMessage) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError>;

    /// 追加已读回执；重复标记返回 false。
    async fn append_read_receipt(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError>;
}

/// 到期记录加上提升时需要的发送/接收方展示字段。
#[derive(Debug, Clone)]
pub struct DueDeferredMessage {
    pub record: DeferredMessage,
    pub sender_username: String,
    pub receiver_username: String,
}

#[async_trait]
pub trait DeferredMessageRepository: Send + Sync {
    /// 一次计划运行的全部记录走单次批量写入。
    async fn bulk_insert(&self, records: &[DeferredMessage]) -> Result<usize, RepositoryError>;

    /// 原子认领到期且未入队未发送的记录：条件更新翻转 `queued`
    /// 并返回翻转成功的记录，并发运行互不重复。
    async fn claim_due(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DueDeferredMessage>, RepositoryError>;

    /// 发布失败后释放认领：回退 `queued` 并记录错误文本，
    /// 下一轮重选会再次拿到该记录。
    async fn release_claim(
        &self,
        id: DeferredMessageId,
        error: &str,
    ) -> Result<(), RepositoryError>;

    async fn mark_sent(&self, id: DeferredMessageId, at: Timestamp)
        -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: DeferredMessageId,
    ) -> Result<Option<DeferredMessage>, RepositoryError>;
}
