//! Redis 在线用户集合

use async_trait::async_trait;
use application::{ApplicationError, PresenceTracker};
use domain::UserId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::redis::map_redis_err;

/// 在线用户集合的键，所有实例共享。
const ONLINE_USERS_KEY: &str = "online_users";

pub struct RedisPresenceTracker {
    manager: ConnectionManager,
}

impl RedisPresenceTracker {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl PresenceTracker for RedisPresenceTracker {
    async fn add(&self, user_id: UserId) -> Result<(), ApplicationError> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(map_redis_err)
    }

    async fn remove(&self, user_id: UserId) -> Result<(), ApplicationError> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(map_redis_err)
    }

    async fn members(&self) -> Result<Vec<UserId>, ApplicationError> {
        let mut conn = self.manager.clone();
        let raw: Vec<String> = conn
            .smembers(ONLINE_USERS_KEY)
            .await
            .map_err(map_redis_err)?;

        // 集合里出现过的坏条目直接忽略，不让单个脏值拖垮名单。
        Ok(raw
            .iter()
            .filter_map(|value| value.parse::<Uuid>().ok())
            .map(UserId::from)
            .collect())
    }

    async fn contains(&self, user_id: UserId) -> Result<bool, ApplicationError> {
        let mut conn = self.manager.clone();
        conn.sismember(ONLINE_USERS_KEY, user_id.to_string())
            .await
            .map_err(map_redis_err)
    }
}
