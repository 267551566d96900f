//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、Kafka 队列、Redis 在线集合与令牌
//! 黑名单等适配器，实现应用/领域层定义的接口。

pub mod db;
pub mod kafka;
pub mod migrations;
pub mod redis;

pub use db::{create_pg_pool, DbPool};
pub use migrations::MIGRATOR;
pub use db::repositories::{
    PgConversationRepository, PgDeferredMessageRepository, PgMessageRepository, PgUserRepository,
};
pub use kafka::{DeliveryConsumer, KafkaError, KafkaMessageQueue, KafkaResult};
pub use redis::{create_redis_manager, RedisPresenceTracker, RedisTokenBlacklist};
