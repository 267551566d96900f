//! 主程序入口
//!
//! 装配全部依赖：连接池、Redis、Kafka、应用服务、后台任务与
//! Axum 服务器。所有服务显式传递，进程内没有全局状态。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use application::{
    ChatService, Clock, DeliveryProcessor, EventBroadcaster, MessagePlanner, OnlineRoster,
    QueuePromoter, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, create_redis_manager, DeliveryConsumer, KafkaMessageQueue,
    PgConversationRepository, PgDeferredMessageRepository, PgMessageRepository, PgUserRepository,
    RedisPresenceTracker, RedisTokenBlacklist, MIGRATOR,
};
use web_api::{router, AppState, ConnectionRegistry, JwtService};

mod jobs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    config.validate().context("invalid configuration")?;

    let pool = Arc::new(
        create_pg_pool(&config.database.url, config.database.max_connections)
            .await
            .context("failed to create postgres pool")?,
    );
    MIGRATOR
        .run(pool.as_ref())
        .await
        .context("failed to run database migrations")?;

    let redis_manager = create_redis_manager(&config.redis.url)
        .await
        .context("failed to connect to redis")?;

    let users: Arc<dyn domain::UserRepository> = Arc::new(PgUserRepository::new(pool.clone()));
    let conversations: Arc<dyn domain::ConversationRepository> =
        Arc::new(PgConversationRepository::new(pool.clone()));
    let messages: Arc<dyn domain::MessageRepository> =
        Arc::new(PgMessageRepository::new(pool.clone()));
    let deferred: Arc<dyn domain::DeferredMessageRepository> =
        Arc::new(PgDeferredMessageRepository::new(pool.clone()));

    let queue = Arc::new(KafkaMessageQueue::new(&config.kafka)?);
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster: Arc<dyn EventBroadcaster> = registry.clone();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let chat_service = Arc::new(ChatService::new(
        users.clone(),
        conversations.clone(),
        messages.clone(),
        broadcaster.clone(),
        clock.clone(),
    ));
    let roster = Arc::new(OnlineRoster::new(
        Arc::new(RedisPresenceTracker::new(redis_manager.clone())),
        users.clone(),
        broadcaster.clone(),
        clock.clone(),
    ));
    let planner = Arc::new(MessagePlanner::new(
        users.clone(),
        conversations.clone(),
        deferred.clone(),
        clock.clone(),
    ));
    let promoter = Arc::new(QueuePromoter::new(
        deferred.clone(),
        queue.clone(),
        clock.clone(),
        config.scheduler.promoter_batch_size,
    ));
    let processor = Arc::new(DeliveryProcessor::new(
        users.clone(),
        conversations.clone(),
        messages.clone(),
        deferred.clone(),
        queue.clone(),
        broadcaster.clone(),
        clock.clone(),
    ));

    let consumer = DeliveryConsumer::new(&config.kafka, processor)?;
    tokio::spawn(async move {
        if let Err(err) = consumer.run().await {
            tracing::error!(error = %err, "delivery consumer terminated");
        }
    });

    tokio::spawn(jobs::run_planner_daily(
        planner,
        config.scheduler.planner_hour,
    ));
    tokio::spawn(jobs::run_promoter(
        promoter.clone(),
        config.scheduler.promoter_interval_secs,
    ));

    let state = AppState {
        users,
        chat_service,
        roster,
        promoter,
        registry,
        jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
        token_blacklist: Arc::new(RedisTokenBlacklist::new(redis_manager)),
        clock,
    };

    let app = router(state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %bind_addr, "messenger server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
