//! 数据库迁移

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
