//! 延迟消息Repository实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ConversationId, DeferredMessage, DeferredMessageId, DeferredMessageRepository,
    DueDeferredMessage, MessageContent, RepositoryError, Timestamp, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

/// 数据库延迟消息模型
#[derive(Debug, Clone, FromRow)]
struct DbDeferredMessage {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub conversation_id: Uuid,
    pub send_date: DateTime<Utc>,
    pub queued: bool,
    pub sent: bool,
    pub queued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// 认领查询的返回行：记录加发送/接收方用户名。
#[derive(Debug, Clone, FromRow)]
struct DbDueRow {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub conversation_id: Uuid,
    pub send_date: DateTime<Utc>,
    pub queued: bool,
    pub sent: bool,
    pub queued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub sender_username: String,
    pub receiver_username: String,
}

fn into_domain(record: DbDeferredMessage) -> Result<DeferredMessage, RepositoryError> {
    let content = MessageContent::new(record.content)
        .map_err(|e| RepositoryError::storage(format!("invalid stored content: {e}")))?;
    Ok(DeferredMessage {
        id: DeferredMessageId::from(record.id),
        content,
        sender_id: UserId::from(record.sender_id),
        receiver_id: UserId::from(record.receiver_id),
        conversation_id: ConversationId::from(record.conversation_id),
        send_date: record.send_date,
        queued: record.queued,
        sent: record.sent,
        queued_at: record.queued_at,
        sent_at: record.sent_at,
        error_message: record.error_message,
        retry_count: record.retry_count.max(0) as u32,
        created_at: record.created_at,
    })
}

pub struct PgDeferredMessageRepository {
    pool: Arc<DbPool>,
}

impl PgDeferredMessageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeferredMessageRepository for PgDeferredMessageRepository {
    /// 一次计划运行的全部记录单条语句批量写入。
    async fn bulk_insert(&self, records: &[DeferredMessage]) -> Result<usize, RepositoryError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO deferred_messages \
             (id, content, sender_id, receiver_id, conversation_id, send_date, queued, sent, retry_count, created_at) ",
        );
        query_builder.push_values(records, |mut b, record| {
            b.push_bind(Uuid::from(record.id))
                .push_bind(record.content.as_str())
                .push_bind(Uuid::from(record.sender_id))
                .push_bind(Uuid::from(record.receiver_id))
                .push_bind(Uuid::from(record.conversation_id))
                .push_bind(record.send_date)
                .push_bind(record.queued)
                .push_bind(record.sent)
                .push_bind(record.retry_count as i32)
                .push_bind(record.created_at);
        });

        let result = query_builder
            .build()
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() as usize)
    }

    /// 条件更新一次性翻转 `queued` 并返回翻转成功的行。
    /// `FOR UPDATE SKIP LOCKED` 保证并发运行互不重复认领。
    async fn claim_due(
        &self,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<DueDeferredMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, DbDueRow>(
            r#"
            WITH claimed AS (
                UPDATE deferred_messages
                SET queued = TRUE, queued_at = $1, error_message = NULL
                WHERE id IN (
                    SELECT id FROM deferred_messages
                    WHERE send_date <= $1 AND queued = FALSE AND sent = FALSE
                    ORDER BY send_date
                    LIMIT $2
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
            )
            SELECT c.id, c.content, c.sender_id, c.receiver_id, c.conversation_id,
                   c.send_date, c.queued, c.sent, c.queued_at, c.sent_at,
                   c.error_message, c.retry_count, c.created_at,
                   s.username AS sender_username,
                   r.username AS receiver_username
            FROM claimed c
            JOIN users s ON s.id = c.sender_id
            JOIN users r ON r.id = c.receiver_id
            ORDER BY c.send_date
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter()
            .map(|row| {
                let record = into_domain(DbDeferredMessage {
                    id: row.id,
                    content: row.content,
                    sender_id: row.sender_id,
                    receiver_id: row.receiver_id,
                    conversation_id: row.conversation_id,
                    send_date: row.send_date,
                    queued: row.queued,
                    sent: row.sent,
                    queued_at: row.queued_at,
                    sent_at: row.sent_at,
                    error_message: row.error_message,
                    retry_count: row.retry_count,
                    created_at: row.created_at,
                })?;
                Ok(DueDeferredMessage {
                    record,
                    sender_username: row.sender_username,
                    receiver_username: row.receiver_username,
                })
            })
            .collect()
    }

    async fn release_claim(
        &self,
        id: DeferredMessageId,
        error: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE deferred_messages
               SET queued = FALSE, queued_at = NULL, error_message = $2,
                   retry_count = LEAST(retry_count + 1, 5)
               WHERE id = $1 AND sent = FALSE"#,
        )
        .bind(Uuid::from(id))
        .bind(error)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: DeferredMessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE deferred_messages SET sent = TRUE, sent_at = $2
               WHERE id = $1 AND queued = TRUE"#,
        )
        .bind(Uuid::from(id))
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict(
                "deferred message cannot be marked sent before it was queued",
            ));
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: DeferredMessageId,
    ) -> Result<Option<DeferredMessage>, RepositoryError> {
        let record = sqlx::query_as::<_, DbDeferredMessage>(
            r#"SELECT id, content, sender_id, receiver_id, conversation_id, send_date,
                      queued, sent, queued_at, sent_at, error_message, retry_count, created_at
               FROM deferred_messages WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(into_domain).transpose()
    }
}
