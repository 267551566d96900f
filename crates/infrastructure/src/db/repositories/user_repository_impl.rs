//! 用户Repository实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ActiveUser, RepositoryError, Timestamp, User, UserDisplay, UserId, UserRepository,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};

/// 数据库用户模型
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(record: DbUser) -> Self {
        User {
            id: UserId::from(record.id),
            username: record.username,
            email: record.email,
            avatar: record.avatar,
            is_active: record.is_active,
            is_online: record.is_online,
            last_seen: record.last_seen,
            created_at: record.created_at,
        }
    }
}

pub struct PgUserRepository {
    pool: Arc<DbPool>,
}

impl PgUserRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, username, email, avatar, is_active, is_online, last_seen, created_at
               FROM users WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(User::from))
    }

    async fn list_active(&self) -> Result<Vec<ActiveUser>, RepositoryError> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"SELECT id, username FROM users WHERE is_active = TRUE"#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, username)| ActiveUser {
                id: UserId::from(id),
                username,
            })
            .collect())
    }

    async fn find_displays(&self, ids: &[UserId]) -> Result<Vec<UserDisplay>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, username, email, avatar, is_active, is_online, last_seen, created_at
               FROM users WHERE id = ANY($1)"#,
        )
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records
            .into_iter()
            .map(|record| User::from(record).display())
            .collect())
    }

    async fn set_online(
        &self,
        id: UserId,
        online: bool,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        sqlx::query(r#"UPDATE users SET is_online = $2, last_seen = $3 WHERE id = $1"#)
            .bind(Uuid::from(id))
            .bind(online)
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}
