//! Kafka 消息队列模块
//!
//! 投递、重试、死信三条主题的生产者与消费者实现。

pub mod consumer;
pub mod error;
pub mod producer;

pub use consumer::*;
pub use error::*;
pub use producer::*;

/// 信封重试计数的消息头，与 JSON 中的 retryCount 同步携带。
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
