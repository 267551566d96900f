//! 会话Repository实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    normalize_pair, Conversation, ConversationId, ConversationRepository, MessageId,
    RepositoryError, Timestamp, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

/// 数据库会话模型
#[derive(Debug, Clone, FromRow)]
struct DbConversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbConversation> for Conversation {
    fn from(record: DbConversation) -> Self {
        Conversation {
            id: ConversationId::from(record.id),
            participant_a: UserId::from(record.participant_a),
            participant_b: UserId::from(record.participant_b),
            last_message_id: record.last_message_id.map(MessageId::from),
            last_message_at: record.last_message_at,
            created_at: record.created_at,
        }
    }
}

pub struct PgConversationRepository {
    pool: Arc<DbPool>,
}

impl PgConversationRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, DbConversation>(
            r#"SELECT id, participant_a, participant_b, last_message_id, last_message_at, created_at
               FROM conversations WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(Conversation::from))
    }

    /// 参与者对在表上有唯一约束，并发创建同一对时
    /// `ON CONFLICT DO NOTHING` 后的重查保证双方拿到同一行。
    async fn find_or_create_direct(
        &self,
        first: UserId,
        second: UserId,
        now: Timestamp,
    ) -> Result<Conversation, RepositoryError> {
        if first == second {
            return Err(RepositoryError::conflict(
                "direct conversation requires two distinct participants",
            ));
        }
        let (a, b) = normalize_pair(first, second);

        sqlx::query(
            r#"INSERT INTO conversations (id, participant_a, participant_b, created_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (participant_a, participant_b) DO NOTHING"#,
        )
        .bind(Uuid::from(ConversationId::generate()))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, DbConversation>(
            r#"SELECT id, participant_a, participant_b, last_message_id, last_message_at, created_at
               FROM conversations WHERE participant_a = $1 AND participant_b = $2"#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_one(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Conversation::from(record))
    }

    async fn record_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE conversations SET last_message_id = $2, last_message_at = $3 WHERE id = $1"#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(message_id))
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
