//! Redis 令牌黑名单
//!
//! 登出的令牌以 `blacklist:<token>` 为键写入，TTL 为令牌
//! 剩余有效期，到期由 Redis 自动清理。

use async_trait::async_trait;
use application::{ApplicationError, TokenBlacklist};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::redis::map_redis_err;

const BLACKLIST_PREFIX: &str = "blacklist:";

pub struct RedisTokenBlacklist {
    manager: ConnectionManager,
}

impl RedisTokenBlacklist {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    fn key(token: &str) -> String {
        format!("{BLACKLIST_PREFIX}{token}")
    }
}

#[async_trait]
impl TokenBlacklist for RedisTokenBlacklist {
    async fn blacklist(&self, token: &str, ttl_secs: u64) -> Result<(), ApplicationError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(Self::key(token), "1", ttl_secs)
            .await
            .map_err(map_redis_err)
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, ApplicationError> {
        let mut conn = self.manager.clone();
        conn.exists(Self::key(token)).await.map_err(map_redis_err)
    }
}
