//! Redis 适配器
//!
//! 在线用户集合与登出令牌黑名单。连接使用自动重连的
//! `ConnectionManager`，跨实例共享同一份状态。

pub mod presence;
pub mod token_blacklist;

pub use presence::RedisPresenceTracker;
pub use token_blacklist::RedisTokenBlacklist;

use application::ApplicationError;

/// 创建自动重连的 Redis 连接管理器。
pub async fn create_redis_manager(
    url: &str,
) -> Result<redis::aio::ConnectionManager, ApplicationError> {
    let client = redis::Client::open(url)
        .map_err(|e| ApplicationError::infrastructure(format!("invalid redis url: {e}")))?;
    client
        .get_connection_manager()
        .await
        .map_err(|e| ApplicationError::infrastructure(format!("redis connection failed: {e}")))
}

pub(crate) fn map_redis_err(err: redis::RedisError) -> ApplicationError {
    ApplicationError::infrastructure(format!("redis error: {err}"))
}
