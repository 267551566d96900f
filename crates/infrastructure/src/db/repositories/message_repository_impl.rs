//! 消息Repository实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatMessage, ConversationId, MessageContent, MessageId, MessageRepository, MessageType,
    ReadReceipt, RepositoryError, Timestamp, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct DbReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

impl DbMessage {
    fn into_domain(self, read_by: Vec<ReadReceipt>) -> Result<ChatMessage, RepositoryError> {
        let message_type = match self.message_type.as_str() {
            "auto" => MessageType::Auto,
            _ => MessageType::Text,
        };
        let content = MessageContent::new(self.content)
            .map_err(|e| RepositoryError::storage(format!("invalid stored content: {e}")))?;
        Ok(ChatMessage {
            id: MessageId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            sender_id: UserId::from(self.sender_id),
            content,
            message_type,
            read_by,
            is_deleted: self.is_deleted,
            created_at: self.created_at,
        })
    }
}

pub struct PgMessageRepository {
    pool: Arc<DbPool>,
}

impl PgMessageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn read_receipts(&self, id: MessageId) -> Result<Vec<ReadReceipt>, RepositoryError> {
        let rows = sqlx::query_as::<_, DbReadReceipt>(
            r#"SELECT user_id, read_at FROM message_reads WHERE message_id = $1 ORDER BY read_at"#,
        )
        .bind(Uuid::from(id))
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|row| ReadReceipt {
                user_id: UserId::from(row.user_id),
                read_at: row.read_at,
            })
            .collect())
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO chat_messages (id, conversation_id, sender_id, content, message_type, is_deleted, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.message_type.as_str())
        .bind(message.is_deleted)
        .bind(message.created_at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<ChatMessage>, RepositoryError> {
        let record = sqlx::query_as::<_, DbMessage>(
            r#"SELECT id, conversation_id, sender_id, content, message_type, is_deleted, created_at
               FROM chat_messages WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => {
                let read_by = self.read_receipts(id).await?;
                Ok(Some(record.into_domain(read_by)?))
            }
            None => Ok(None),
        }
    }

    /// 已读表按 (message_id, user_id) 唯一，重复标记不落新行。
    async fn append_read_receipt(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO message_reads (message_id, user_id, read_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (message_id, user_id) DO NOTHING"#,
        )
        .bind(Uuid::from(message_id))
        .bind(Uuid::from(user_id))
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }
}
