//! Kafka 错误类型定义

use thiserror::Error;

/// Kafka 操作错误
#[derive(Error, Debug)]
pub enum KafkaError {
    /// 连接错误
    #[error("kafka connection error: {message}")]
    ConnectionError { message: String },

    /// 生产者错误
    #[error("kafka producer error: {message}")]
    ProducerError { message: String },

    /// 消费者错误
    #[error("kafka consumer error: {message}")]
    ConsumerError { message: String },

    /// 序列化错误
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// 配置错误
    #[error("configuration error: {message}")]
    ConfigError { message: String },
}

/// Kafka 结果类型
pub type KafkaResult<T> = Result<T, KafkaError>;

impl From<rdkafka::error::KafkaError> for KafkaError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        match err {
            rdkafka::error::KafkaError::ClientConfig(..) => KafkaError::ConfigError {
                message: err.to_string(),
            },
            rdkafka::error::KafkaError::ConsumerCommit(_) => KafkaError::ConsumerError {
                message: err.to_string(),
            },
            _ => KafkaError::ConnectionError {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for KafkaError {
    fn from(err: serde_json::Error) -> Self {
        KafkaError::SerializationError {
            message: err.to_string(),
        }
    }
}
